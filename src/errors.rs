use std::path::PathBuf;
use thiserror::Error;

use crate::stage::Stage;

#[derive(Error, Debug)]
pub enum EqualizeError {
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("No compute device available: {message}")]
    NoDevice { message: String },

    #[error("Failed to load kernel '{kernel}' from '{path}': {message}")]
    KernelLoad {
        kernel: String,
        path: PathBuf,
        message: String,
    },

    #[error("Kernel build failed for stage '{stage}': {log}")]
    KernelBuild { stage: Stage, log: String },

    #[error("Buffer allocation failed for '{buffer}': {message}")]
    Allocation { buffer: String, message: String },

    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: Stage, message: String },

    #[error("Buffer transfer failed for '{buffer}': {message}")]
    Transfer { buffer: String, message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Image too large: {pixels} pixels (maximum {max})")]
    ImageTooLarge { pixels: usize, max: usize },

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Thread pool error: {message}")]
    ThreadPool { message: String },

    #[error("Image error: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, EqualizeError>;

impl EqualizeError {
    /// The pipeline stage the failure belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EqualizeError::KernelBuild { stage, .. } | EqualizeError::StageFailed { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }

    /// True for failures raised before any stage could run.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            EqualizeError::InvalidConfiguration { .. }
                | EqualizeError::NoDevice { .. }
                | EqualizeError::KernelLoad { .. }
                | EqualizeError::KernelBuild { .. }
                | EqualizeError::ThreadPool { .. }
        )
    }

    /// Returns a user-friendly error message with recovery suggestions
    pub fn user_message(&self) -> String {
        let base_message = self.to_string();
        let suggestion = match self {
            EqualizeError::InvalidConfiguration { .. } => "Run `histeq devices` to list valid platform and device ids.",
            EqualizeError::NoDevice { .. } => "Install a Vulkan, Metal or DX12 capable driver, or pass --host to run on the CPU.",
            EqualizeError::KernelLoad { .. } => "Check the kernel directory contains histogram.wgsl, cum_hist.wgsl, LUT.wgsl and re_project.wgsl.",
            EqualizeError::KernelBuild { .. } => "The kernel source failed to compile. Check the build log above.",
            EqualizeError::Allocation { .. } | EqualizeError::ImageTooLarge { .. } => "The image does not fit in device memory. Try a smaller image or the host device.",
            EqualizeError::StageFailed { .. } | EqualizeError::Transfer { .. } => "The compute device reported a failure. Updating the graphics driver may help.",
            EqualizeError::Image { .. } => "The image could not be decoded or encoded. Check the file format.",
            EqualizeError::Io { .. } => "File system error occurred. Check the path and permissions.",
            EqualizeError::Json { .. } => "The settings file is not valid JSON.",
            _ => "An unexpected error occurred.",
        };

        format!("{}\n\n{}", base_message, suggestion)
    }

    /// Returns an error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            EqualizeError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            EqualizeError::NoDevice { .. } => "NO_DEVICE",
            EqualizeError::KernelLoad { .. } => "KERNEL_LOAD_ERROR",
            EqualizeError::KernelBuild { .. } => "KERNEL_BUILD_ERROR",
            EqualizeError::Allocation { .. } => "ALLOCATION_ERROR",
            EqualizeError::StageFailed { .. } => "STAGE_FAILED",
            EqualizeError::Transfer { .. } => "TRANSFER_ERROR",
            EqualizeError::InvalidInput { .. } => "INVALID_INPUT",
            EqualizeError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            EqualizeError::InvalidOperation { .. } => "INVALID_OPERATION",
            EqualizeError::ThreadPool { .. } => "THREAD_POOL_ERROR",
            EqualizeError::Image { .. } => "IMAGE_ERROR",
            EqualizeError::Io { .. } => "IO_ERROR",
            EqualizeError::Json { .. } => "JSON_ERROR",
        }
    }

    /// Logs the error with its code.
    pub fn log_and_report(&self) {
        tracing::error!(code = self.error_code(), stage = ?self.stage(), "{}", self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failures_carry_stage_identity() {
        let error = EqualizeError::StageFailed {
            stage: Stage::CumulativeHistogram,
            message: "Validation Error: buffer bound twice".to_string(),
        };

        assert_eq!(error.stage(), Some(Stage::CumulativeHistogram));
        assert_eq!(error.error_code(), "STAGE_FAILED");
        let text = error.to_string();
        assert!(text.contains("cum_hist"));
        assert!(text.contains("buffer bound twice"));
        assert!(!error.is_startup_error());
    }

    #[test]
    fn configuration_errors_are_startup_errors() {
        let error = EqualizeError::InvalidConfiguration {
            message: "platform 7 out of range".to_string(),
        };
        assert!(error.is_startup_error());
        assert_eq!(error.stage(), None);
        assert!(error.user_message().contains("histeq devices"));
    }
}
