//! Inference backend capability negotiation
//!
//! Capabilities are probed once at startup. Mapping them to an ordered
//! provider list is a pure function so it can be tested without hardware.

use serde::{Deserialize, Serialize};

/// Hardware or runtime capability available to inference stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Cuda,
    Metal,
    Avx2,
    Cpu,
}

/// Execution provider a stage runtime can be asked to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionProvider {
    Cuda,
    CoreMl,
    CpuAvx2,
    Cpu,
}

/// Probe the host. `Cpu` is always reported.
pub fn probe_capabilities() -> Vec<Capability> {
    let mut caps = Vec::new();

    let cuda_visible = std::env::var("CUDA_VISIBLE_DEVICES")
        .map(|v| !v.trim().is_empty() && v.trim() != "-1")
        .unwrap_or(false);
    if cuda_visible {
        caps.push(Capability::Cuda);
    }

    if cfg!(target_os = "macos") {
        caps.push(Capability::Metal);
    }

    if has_avx2() {
        caps.push(Capability::Avx2);
    }

    caps.push(Capability::Cpu);
    tracing::debug!(?caps, "Probed inference capabilities");
    caps
}

#[cfg(target_arch = "x86_64")]
fn has_avx2() -> bool {
    std::is_x86_feature_detected!("avx2")
}

#[cfg(not(target_arch = "x86_64"))]
fn has_avx2() -> bool {
    false
}

/// Preferred providers, best first. Plain CPU is always present and last.
pub fn preferred_providers(caps: &[Capability]) -> Vec<ExecutionProvider> {
    let mut providers = Vec::new();
    if caps.contains(&Capability::Cuda) {
        providers.push(ExecutionProvider::Cuda);
    }
    if caps.contains(&Capability::Metal) {
        providers.push(ExecutionProvider::CoreMl);
    }
    if caps.contains(&Capability::Avx2) {
        providers.push(ExecutionProvider::CpuAvx2);
    }
    providers.push(ExecutionProvider::Cpu);
    providers
}
