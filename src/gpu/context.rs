//! Headless device acquisition

use std::sync::Arc;

use crate::error::{EngineError, EngineResult};

/// Storage buffers the triangle culling and decode passes bind at once
pub const REQUIRED_STORAGE_BUFFERS_PER_STAGE: u32 = 12;

/// Device, queue and adapter description shared by every pipeline
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Request a headless adapter and a device with the limits the pipeline needs
    pub async fn new_headless() -> EngineResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| EngineError::resource("GPU adapter", "no compatible adapter found"))?;

        let adapter_info = adapter.get_info();
        let supported = adapter.limits();
        if supported.max_storage_buffers_per_shader_stage < REQUIRED_STORAGE_BUFFERS_PER_STAGE {
            return Err(EngineError::resource(
                "GPU device",
                format!(
                    "adapter {} supports {} storage buffers per stage, {} required",
                    adapter_info.name,
                    supported.max_storage_buffers_per_shader_stage,
                    REQUIRED_STORAGE_BUFFERS_PER_STAGE
                ),
            ));
        }

        let required_limits = wgpu::Limits {
            max_storage_buffers_per_shader_stage: REQUIRED_STORAGE_BUFFERS_PER_STAGE,
            max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
            max_buffer_size: supported.max_buffer_size,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Meshlet Engine Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                },
                None,
            )
            .await
            .map_err(|e| EngineError::resource("GPU device", e.to_string()))?;

        log::info!(
            "[GpuContext::new_headless] Using {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
        })
    }

    /// Blocking variant for tests and tools; `None` when no usable adapter exists
    pub fn try_headless() -> Option<Self> {
        match pollster::block_on(Self::new_headless()) {
            Ok(context) => Some(context),
            Err(e) => {
                log::warn!("[GpuContext::try_headless] {}", e);
                None
            }
        }
    }

    /// Run `create` inside a validation error scope, turning failures into `ResourceCreationFailure`
    pub fn create_checked<T>(&self, resource: &str, create: impl FnOnce(&wgpu::Device) -> T) -> EngineResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match validation.or(out_of_memory) {
            Some(error) => Err(EngineError::resource(resource, error.to_string())),
            None => Ok(value),
        }
    }
}
