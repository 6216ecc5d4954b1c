// services/tx/simulation/simulation_service.rs

use crate::errors::error::AppError;
use crate::infrastructure::relay::{BundleTransport, SimulationReport};
use crate::models::SignedBundle;
use crate::utils::to_gwei;
use crate::{log_info, log_warn};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationVerdict {
    Passed(SimulationReport),
    /// 中继给出的原因，原样保留
    Failed(String),
}

/// 提交前的模拟闸门：模拟失败的 bundle 不会被提交
pub struct SimulationService {
    transport: Arc<dyn BundleTransport>,
}

impl SimulationService {
    pub fn new(transport: Arc<dyn BundleTransport>) -> Self {
        Self { transport }
    }

    pub async fn run(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> Result<SimulationVerdict, AppError> {
        let report = self.transport.simulate(bundle, target_block).await?;
        match report.failure_reason() {
            Some(reason) => {
                log_warn!("bundle 模拟失败 (target {}): {}", target_block, reason);
                Ok(SimulationVerdict::Failed(reason))
            }
            None => {
                log_info!(
                    "bundle 模拟通过: gasUsed={} 有效 gas price={} gwei",
                    report.total_gas_used,
                    to_gwei(report.effective_gas_price())
                );
                Ok(SimulationVerdict::Passed(report))
            }
        }
    }
}
