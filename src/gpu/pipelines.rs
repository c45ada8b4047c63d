use super::types::{StagePipeline, StagePipelines};
use crate::errors::{EqualizeError, Result};
use crate::kernels::KernelLibrary;
use crate::stage::Stage;

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Binding layout of each kernel; must match the `@binding` declarations in the WGSL.
fn layout_entries(stage: Stage) -> Vec<wgpu::BindGroupLayoutEntry> {
    match stage {
        // pixels, histogram, params
        Stage::Histogram => vec![storage_entry(0, true), storage_entry(1, false), uniform_entry(2)],
        // histogram, cumulative
        Stage::CumulativeHistogram => vec![storage_entry(0, true), storage_entry(1, false)],
        // cumulative, lut
        Stage::Lut => vec![storage_entry(0, true), storage_entry(1, false)],
        // pixels, lut, output, params
        Stage::ReProject => vec![
            storage_entry(0, true),
            storage_entry(1, true),
            storage_entry(2, false),
            uniform_entry(3),
        ],
    }
}

impl StagePipelines {
    pub fn build(device: &wgpu::Device, kernels: &KernelLibrary) -> Result<Self> {
        let mut stages = Vec::with_capacity(Stage::ORDER.len());
        for stage in Stage::ORDER {
            let source = kernels.source(stage)?;
            stages.push(create_stage_pipeline(device, stage, &source)?);
        }
        Ok(Self { stages })
    }
}

/// Compiles one kernel. Validation errors from naga or the pipeline
/// layout come back as the build log of that stage.
fn create_stage_pipeline(device: &wgpu::Device, stage: Stage, source: &str) -> Result<StagePipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(stage.kernel_name()),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{}_bind_group_layout", stage.kernel_name())),
        entries: &layout_entries(stage),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{}_pipeline_layout", stage.kernel_name())),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("{}_pipeline", stage.kernel_name())),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        tracing::error!(kernel = stage.kernel_name(), "kernel build failed");
        return Err(EqualizeError::KernelBuild {
            stage,
            log: error.to_string(),
        });
    }

    tracing::debug!(kernel = stage.kernel_name(), "kernel built");
    Ok(StagePipeline {
        bind_group_layout,
        pipeline,
    })
}
