//! wgpu compute environment running the kernels in `shaders/fluid.wgsl`.

use std::collections::HashMap;
use std::num::NonZeroU64;

use wgpu::{
    BindGroup, BindGroupLayout, Buffer, CommandEncoder, ComputePipeline, Device, Queue, Texture,
    TextureFormat, TextureView,
};

use crate::backend::ComputeBackend;
use crate::error::FluidError;
use crate::grid::{FieldSnapshot, GridFormat, GridId};
use crate::kernels::Kernel;
use crate::params::{ImpulseParams, SimulationConstants};

const IMPULSE_BINDING: u32 = 0;
const CONSTANTS_BINDING: u32 = 1;
const FIRST_GRID_BINDING: u32 = 2;

fn texture_format(format: GridFormat) -> TextureFormat {
    match format {
        GridFormat::Vector2 => TextureFormat::Rg32Float,
        GridFormat::Scalar => TextureFormat::R32Float,
        // Stored as float; every kernel that writes dye clamps to [0, 1].
        GridFormat::Color => TextureFormat::Rgba32Float,
        GridFormat::Output => TextureFormat::Rgba8Unorm,
    }
}

fn bytes_per_texel(format: GridFormat) -> u32 {
    match format {
        GridFormat::Vector2 => 8,
        GridFormat::Scalar => 4,
        GridFormat::Color => 16,
        GridFormat::Output => 4,
    }
}

fn grid_binding(grid: GridId) -> u32 {
    FIRST_GRID_BINDING + grid.index() as u32
}

struct GpuGrid {
    texture: Texture,
    view: TextureView,
    width: u32,
    height: u32,
    format: GridFormat,
}

impl GpuGrid {
    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

pub struct GpuBackend {
    device: Device,
    queue: Queue,
    bind_group_layout: BindGroupLayout,
    impulse_buffer: Buffer,
    constants_buffer: Buffer,
    pipelines: HashMap<Kernel, ComputePipeline>,
    grids: [Option<GpuGrid>; 8],
    bind_group: Option<BindGroup>,
    encoder: Option<CommandEncoder>,
}

impl GpuBackend {
    pub async fn new() -> Result<Self, FluidError> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(FluidError::NoAdapter)?;
        log::info!("Using adapter: {:?}", adapter.get_info());

        if !adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(FluidError::UnsupportedAdapter("compute shaders".into()));
        }

        let required_features =
            wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES | wgpu::Features::CLEAR_TEXTURE;
        if !adapter.features().contains(required_features) {
            return Err(FluidError::UnsupportedAdapter(format!(
                "{:?}",
                required_features - adapter.features()
            )));
        }

        for format in [
            GridFormat::Vector2,
            GridFormat::Scalar,
            GridFormat::Color,
        ] {
            let features = adapter.get_texture_format_features(texture_format(format));
            if !features
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::STORAGE_READ_WRITE)
            {
                return Err(FluidError::UnsupportedAdapter(format!(
                    "read-write storage for {:?}",
                    texture_format(format)
                )));
            }
        }

        let grid_count = GridId::ALL.len() as u32;
        if adapter.limits().max_storage_textures_per_shader_stage < grid_count {
            return Err(FluidError::UnsupportedAdapter(format!(
                "{} storage textures per stage",
                grid_count
            )));
        }
        let required_limits = wgpu::Limits {
            max_storage_textures_per_shader_stage: grid_count,
            ..wgpu::Limits::downlevel_defaults()
        }
        .using_resolution(adapter.limits());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("dyeflow device"),
                    required_features,
                    required_limits,
                },
                None,
            )
            .await?;

        let uniform_size = NonZeroU64::new(std::mem::size_of::<ImpulseParams>() as u64);
        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: IMPULSE_BINDING,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: uniform_size,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: CONSTANTS_BINDING,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(
                        std::mem::size_of::<SimulationConstants>() as u64,
                    ),
                },
                count: None,
            },
        ];
        for grid in GridId::ALL {
            let access = if grid == GridId::Output {
                wgpu::StorageTextureAccess::WriteOnly
            } else {
                wgpu::StorageTextureAccess::ReadWrite
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: grid_binding(grid),
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access,
                    format: texture_format(grid.format()),
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            });
        }
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fluid Bind Group Layout"),
            entries: &entries,
        });

        let impulse_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Impulse Parameters"),
            size: std::mem::size_of::<ImpulseParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let constants_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Simulation Constants"),
            size: std::mem::size_of::<SimulationConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            device,
            queue,
            bind_group_layout,
            impulse_buffer,
            constants_buffer,
            pipelines: HashMap::new(),
            grids: Default::default(),
            bind_group: None,
            encoder: None,
        })
    }

    /// Blocks on [`GpuBackend::new`] with a throwaway tokio runtime.
    pub fn new_blocking() -> Result<Self, FluidError> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(Self::new())
    }

    fn grid(&self, id: GridId) -> Result<&GpuGrid, FluidError> {
        self.grids[id.index()]
            .as_ref()
            .ok_or(FluidError::MissingGrid(id.name()))
    }

    fn create_bind_group(&self) -> Option<BindGroup> {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: IMPULSE_BINDING,
                resource: self.impulse_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: CONSTANTS_BINDING,
                resource: self.constants_buffer.as_entire_binding(),
            },
        ];
        for grid in GridId::ALL {
            let g = self.grids[grid.index()].as_ref()?;
            entries.push(wgpu::BindGroupEntry {
                binding: grid_binding(grid),
                resource: wgpu::BindingResource::TextureView(&g.view),
            });
        }
        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fluid Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        }))
    }

    fn encoder(&mut self) -> &mut CommandEncoder {
        self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Fluid Step Encoder"),
                })
        })
    }
}

impl ComputeBackend for GpuBackend {
    fn load_program(&mut self, constants: &SimulationConstants) -> Result<(), FluidError> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Fluid Kernels"),
                source: wgpu::ShaderSource::Wgsl(include_str!("shaders/fluid.wgsl").into()),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Fluid Pipeline Layout"),
                bind_group_layouts: &[&self.bind_group_layout],
                push_constant_ranges: &[],
            });

        for kernel in Kernel::ALL {
            let pipeline = self
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(kernel.entry_point()),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: kernel.entry_point(),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                });
            self.pipelines.insert(kernel, pipeline);
        }

        self.queue
            .write_buffer(&self.constants_buffer, 0, bytemuck::bytes_of(constants));
        log::info!("Compiled {} fluid kernels", self.pipelines.len());
        Ok(())
    }

    fn allocate(
        &mut self,
        slot: GridId,
        width: u32,
        height: u32,
        format: GridFormat,
    ) -> Result<(), FluidError> {
        if self.pipelines.is_empty() {
            return Err(FluidError::ProgramNotLoaded);
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(slot.name()),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(format),
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.grids[slot.index()] = Some(GpuGrid {
            texture,
            view,
            width,
            height,
            format,
        });
        self.bind_group = None;
        Ok(())
    }

    fn clear(&mut self, grid: GridId) {
        self.encoder();
        let (Some(encoder), Some(g)) = (self.encoder.as_mut(), self.grids[grid.index()].as_ref())
        else {
            return;
        };
        encoder.clear_texture(&g.texture, &wgpu::ImageSubresourceRange::default());
    }

    fn copy(&mut self, src: GridId, dst: GridId) {
        self.encoder();
        let (Some(encoder), Some(s), Some(d)) = (
            self.encoder.as_mut(),
            self.grids[src.index()].as_ref(),
            self.grids[dst.index()].as_ref(),
        ) else {
            log::error!("Cannot copy {} into {}", src.name(), dst.name());
            return;
        };
        encoder.copy_texture_to_texture(s.texture.as_image_copy(), d.texture.as_image_copy(), s.extent());
    }

    fn upload(&mut self, params: &ImpulseParams) {
        // Queue writes land before the next submission, so earlier dispatches
        // must be submitted first.
        self.submit();
        self.queue
            .write_buffer(&self.impulse_buffer, 0, bytemuck::bytes_of(params));
    }

    fn dispatch(&mut self, kernel: Kernel, blocks: [u32; 2]) {
        if self.bind_group.is_none() {
            self.bind_group = self.create_bind_group();
        }
        self.encoder();
        let (Some(encoder), Some(pipeline), Some(bind_group)) = (
            self.encoder.as_mut(),
            self.pipelines.get(&kernel),
            self.bind_group.as_ref(),
        ) else {
            log::error!("Dispatch of {:?} before program load and allocation", kernel);
            return;
        };

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.entry_point()),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(blocks[0], blocks[1], 1);
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn read_grid(&mut self, grid: GridId) -> Result<FieldSnapshot, FluidError> {
        self.submit();
        let g = self.grid(grid)?;
        let texel = bytes_per_texel(g.format);
        let unpadded = g.width * texel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let read_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Grid Readback"),
            size: padded as u64 * g.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            g.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &read_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(g.height),
                },
            },
            g.extent(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = read_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| FluidError::BufferMapping(e.to_string()))?
            .map_err(|e| FluidError::BufferMapping(e.to_string()))?;

        let channels = g.format.channels();
        let mut data = Vec::with_capacity(g.width as usize * g.height as usize * channels);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded as usize) {
                let row = &row[..unpadded as usize];
                if g.format == GridFormat::Output {
                    data.extend(row.iter().map(|&b| b as f32 / 255.0));
                } else {
                    data.extend(
                        row.chunks_exact(4)
                            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
                    );
                }
            }
        }
        read_buffer.unmap();

        Ok(FieldSnapshot {
            width: g.width as usize,
            height: g.height as usize,
            channels,
            data,
        })
    }

    fn write_grid(&mut self, grid: GridId, data: &[f32]) -> Result<(), FluidError> {
        self.submit();
        let g = self.grid(grid)?;
        let expected = g.width as usize * g.height as usize * g.format.channels();
        if data.len() != expected {
            return Err(FluidError::InvalidConfig(format!(
                "{} expects {} values, got {}",
                grid.name(),
                expected,
                data.len()
            )));
        }

        let bytes: Vec<u8> = match g.format {
            GridFormat::Output => data
                .iter()
                .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
                .collect(),
            GridFormat::Color => data
                .iter()
                .flat_map(|v| v.clamp(0.0, 1.0).to_le_bytes())
                .collect(),
            _ => data.iter().flat_map(|v| v.to_le_bytes()).collect(),
        };
        self.queue.write_texture(
            g.texture.as_image_copy(),
            &bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(g.width * bytes_per_texel(g.format)),
                rows_per_image: Some(g.height),
            },
            g.extent(),
        );
        Ok(())
    }
}
