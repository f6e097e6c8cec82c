//! Staging-buffer readback

use bytemuck::Pod;

use crate::renderer::error::{RendererErrorContext, RendererResult};

/// Map a `MAP_READ` staging buffer and copy its contents out.
///
/// The copy into `staging` must already have been submitted.
pub async fn read_staging<T: Pod>(
    device: &wgpu::Device,
    staging: &wgpu::Buffer,
) -> RendererResult<Vec<T>> {
    let slice = staging.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        sender.send(result).ok();
    });

    device.poll(wgpu::Maintain::Wait);

    receiver
        .await
        .during("map staging buffer")?
        .during("map staging buffer")?;

    let values = {
        let data = slice.get_mapped_range();
        bytemuck::cast_slice::<u8, T>(&data).to_vec()
    };
    staging.unmap();
    Ok(values)
}

pub fn read_staging_blocking<T: Pod>(
    device: &wgpu::Device,
    staging: &wgpu::Buffer,
) -> RendererResult<Vec<T>> {
    pollster::block_on(read_staging(device, staging))
}
