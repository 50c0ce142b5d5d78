//! GPU discovery and selection.
//!
//! [`GpuChecker`] is built once by the application and passed to whoever needs
//! device information. Where the information comes from is behind
//! [`DeviceProbe`], so the checker can be driven by llama.cpp's backend
//! registry in the binary and by a fixed device list in tests.

use llama_cpp_2::LlamaBackendDeviceType;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Kind of compute device reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Accelerator,
    Unknown,
}

/// One compute device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// Position of the device within its listing
    pub index: usize,
    pub name: String,
    pub description: String,
    /// Backend driving the device, e.g. `CUDA` or `Metal`
    pub backend: String,
    pub kind: DeviceKind,
    /// Bytes
    pub memory_total: usize,
    /// Bytes
    pub memory_free: usize,
}

impl DeviceInfo {
    pub fn memory_total_gb(&self) -> f64 {
        self.memory_total as f64 / GIB
    }

    pub fn memory_free_gb(&self) -> f64 {
        self.memory_free as f64 / GIB
    }
}

/// Memory figures for one device, in GB
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryInfo {
    pub total_gb: f64,
    pub free_gb: f64,
    pub used_gb: f64,
}

/// Source of device information
pub trait DeviceProbe {
    /// Whether the linked llama.cpp build can offload layers at all
    fn gpu_offload_supported(&self) -> bool;

    /// Every device the backend knows about, CPU included
    fn devices(&self) -> Result<Vec<DeviceInfo>>;
}

/// Reads devices from llama.cpp's ggml backend registry
#[derive(Debug, Default, Clone, Copy)]
pub struct LlamaDeviceProbe;

impl DeviceProbe for LlamaDeviceProbe {
    fn gpu_offload_supported(&self) -> bool {
        llama_cpp_2::llama_supports_gpu_offload()
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        crate::model::backend()?;
        let devices = llama_cpp_2::list_llama_ggml_backend_devices()
            .into_iter()
            .enumerate()
            .map(|(index, device)| DeviceInfo {
                index,
                kind: device_kind(device.device_type),
                name: device.name,
                description: device.description,
                backend: device.backend,
                memory_total: device.memory_total as usize,
                memory_free: device.memory_free as usize,
            })
            .collect();
        Ok(devices)
    }
}

fn device_kind(device_type: LlamaBackendDeviceType) -> DeviceKind {
    match device_type {
        LlamaBackendDeviceType::Gpu | LlamaBackendDeviceType::IntegratedGpu => DeviceKind::Gpu,
        LlamaBackendDeviceType::Cpu => DeviceKind::Cpu,
        LlamaBackendDeviceType::Accelerator => DeviceKind::Accelerator,
        LlamaBackendDeviceType::Unknown => DeviceKind::Unknown,
    }
}

/// Answers questions about available GPUs and remembers the selected one
pub struct GpuChecker<P> {
    probe: P,
    selected: Option<usize>,
}

impl<P: DeviceProbe> GpuChecker<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            selected: None,
        }
    }

    /// GPUs only, numbered from 0 in the order llama.cpp uses for `main_gpu`
    pub fn gpu_info(&self) -> Result<Vec<DeviceInfo>> {
        let gpus = self
            .probe
            .devices()?
            .into_iter()
            .filter(|device| device.kind == DeviceKind::Gpu)
            .enumerate()
            .map(|(index, device)| DeviceInfo { index, ..device })
            .collect();
        Ok(gpus)
    }

    pub fn gpu_count(&self) -> usize {
        self.gpu_info().map(|gpus| gpus.len()).unwrap_or(0)
    }

    /// True when llama.cpp can offload and at least one GPU is present
    pub fn is_available(&self) -> bool {
        self.probe.gpu_offload_supported() && self.gpu_count() > 0
    }

    /// Selected GPU, or the first one when nothing was selected
    pub fn current_device(&self) -> Option<usize> {
        if !self.is_available() {
            return None;
        }
        Some(self.selected.unwrap_or(0))
    }

    /// Select the GPU to use as `main_gpu`
    pub fn set_device(&mut self, index: usize) -> Result<()> {
        if !self.is_available() {
            warn!("No GPU is available");
            return Err(Error::DeviceError("no GPU is available".to_string()));
        }
        let count = self.gpu_count();
        if index >= count {
            return Err(Error::DeviceError(format!(
                "GPU device {} does not exist ({} found)",
                index, count
            )));
        }
        self.selected = Some(index);
        info!("Set GPU device to {}", index);
        Ok(())
    }

    /// Memory figures for a GPU, the current one when `index` is `None`
    pub fn memory_info(&self, index: Option<usize>) -> Option<MemoryInfo> {
        let index = index.or_else(|| self.current_device())?;
        let gpus = self.gpu_info().ok()?;
        let device = gpus.get(index)?;
        let total_gb = device.memory_total_gb();
        let free_gb = device.memory_free_gb();
        Some(MemoryInfo {
            total_gb,
            free_gb,
            used_gb: (total_gb - free_gb).max(0.0),
        })
    }

    /// Human readable report of the GPUs and the current selection
    pub fn summary(&self) -> Result<String> {
        if !self.probe.gpu_offload_supported() {
            return Ok("GPU offload is not supported by this build\n".to_string());
        }
        let gpus = self.gpu_info()?;
        if gpus.is_empty() {
            return Ok("No GPU is available\n".to_string());
        }

        let mut out = format!("GPU is available! Found {} GPU(s)\n", gpus.len());
        for gpu in &gpus {
            out.push_str(&format!(
                "   GPU {}: {} ({:.1} GB) [{}]\n",
                gpu.index,
                gpu.description,
                gpu.memory_total_gb(),
                gpu.backend
            ));
        }

        if let Some(current) = self.current_device() {
            out.push_str(&format!("Using GPU device: {}\n", current));
            if let Some(memory) = self.memory_info(Some(current)) {
                out.push_str(&format!(
                    "Memory - Used: {:.2} GB, Free: {:.2} GB\n",
                    memory.used_gb, memory.free_gb
                ));
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe {
        offload: bool,
        devices: Vec<DeviceInfo>,
    }

    fn device(name: &str, kind: DeviceKind, total_gb: usize, free_gb: usize) -> DeviceInfo {
        let gib = 1024 * 1024 * 1024;
        DeviceInfo {
            index: 0,
            name: name.to_string(),
            description: format!("{name} description"),
            backend: "CUDA".to_string(),
            kind,
            memory_total: total_gb * gib,
            memory_free: free_gb * gib,
        }
    }

    impl DeviceProbe for FixedProbe {
        fn gpu_offload_supported(&self) -> bool {
            self.offload
        }

        fn devices(&self) -> Result<Vec<DeviceInfo>> {
            Ok(self.devices.clone())
        }
    }

    fn two_gpus() -> GpuChecker<FixedProbe> {
        GpuChecker::new(FixedProbe {
            offload: true,
            devices: vec![
                device("CUDA0", DeviceKind::Gpu, 24, 20),
                device("CPU", DeviceKind::Cpu, 64, 32),
                device("CUDA1", DeviceKind::Gpu, 8, 2),
            ],
        })
    }

    #[test]
    fn only_gpus_are_counted() {
        let checker = two_gpus();
        let gpus = checker.gpu_info().unwrap();
        assert_eq!(checker.gpu_count(), 2);
        assert_eq!(gpus[1].name, "CUDA1");
        assert_eq!(gpus[1].index, 1);
        assert!(checker.is_available());
    }

    #[test]
    fn cpu_only_build_is_unavailable() {
        let checker = GpuChecker::new(FixedProbe {
            offload: false,
            devices: vec![device("CPU", DeviceKind::Cpu, 64, 32)],
        });
        assert!(!checker.is_available());
        assert_eq!(checker.current_device(), None);
        assert!(checker.memory_info(None).is_none());
        assert!(checker.summary().unwrap().contains("not supported"));
    }

    #[test]
    fn set_device_checks_range() {
        let mut checker = two_gpus();
        assert_eq!(checker.current_device(), Some(0));
        checker.set_device(1).unwrap();
        assert_eq!(checker.current_device(), Some(1));
        assert!(matches!(checker.set_device(2), Err(Error::DeviceError(_))));
        assert_eq!(checker.current_device(), Some(1));
    }

    #[test]
    fn set_device_without_gpu_fails() {
        let mut checker = GpuChecker::new(FixedProbe {
            offload: true,
            devices: Vec::new(),
        });
        assert!(matches!(checker.set_device(0), Err(Error::DeviceError(_))));
    }

    #[test]
    fn memory_of_current_device() {
        let mut checker = two_gpus();
        checker.set_device(1).unwrap();
        let memory = checker.memory_info(None).unwrap();
        assert_eq!(memory.total_gb, 8.0);
        assert_eq!(memory.free_gb, 2.0);
        assert_eq!(memory.used_gb, 6.0);
    }

    #[test]
    fn summary_lists_gpus() {
        let summary = two_gpus().summary().unwrap();
        assert!(summary.contains("Found 2 GPU(s)"));
        assert!(summary.contains("GPU 1: CUDA1 description (8.0 GB) [CUDA]"));
        assert!(summary.contains("Using GPU device: 0"));
        assert!(summary.contains("Used: 4.00 GB, Free: 20.00 GB"));
    }

    #[test]
    fn device_types_are_classified() {
        assert_eq!(device_kind(LlamaBackendDeviceType::Gpu), DeviceKind::Gpu);
        assert_eq!(device_kind(LlamaBackendDeviceType::IntegratedGpu), DeviceKind::Gpu);
        assert_eq!(device_kind(LlamaBackendDeviceType::Cpu), DeviceKind::Cpu);
        assert_eq!(
            device_kind(LlamaBackendDeviceType::Accelerator),
            DeviceKind::Accelerator
        );
        assert_eq!(device_kind(LlamaBackendDeviceType::Unknown), DeviceKind::Unknown);
    }

    #[test]
    fn summary_without_gpus() {
        let checker = GpuChecker::new(FixedProbe {
            offload: true,
            devices: vec![device("CPU", DeviceKind::Cpu, 64, 32)],
        });
        assert_eq!(checker.summary().unwrap(), "No GPU is available\n");
    }
}
