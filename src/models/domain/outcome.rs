use std::fmt;

/// 一次尝试的最终结果，驱动循环的重试/终止决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Included,
    BlockPassedNotIncluded,
    /// 某个签名账户的 nonce 已被消耗，继续提交只会得到无效交易
    AccountNonceTooHigh,
    SimulationFailed(String),
    RelaySubmissionFailed(String),
    Unknown(String),
    /// 仅 simulate 模式：模拟通过，未提交
    SimulationPassed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopDecision {
    /// 任务完成，正常退出
    Finish,
    /// 重新读取链头，开始下一轮
    Retry,
    /// 不可恢复，进程以失败退出
    Abort,
}

impl Outcome {
    pub fn decision(&self) -> LoopDecision {
        match self {
            Outcome::Included | Outcome::AccountNonceTooHigh | Outcome::SimulationPassed => {
                LoopDecision::Finish
            }
            Outcome::RelaySubmissionFailed(_) => LoopDecision::Abort,
            Outcome::BlockPassedNotIncluded
            | Outcome::SimulationFailed(_)
            | Outcome::Unknown(_) => LoopDecision::Retry,
        }
    }

    /// 未上链类结果，触发 tip 升级
    pub fn is_miss(&self) -> bool {
        matches!(self, Outcome::BlockPassedNotIncluded | Outcome::Unknown(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Included => f.write_str("Included"),
            Outcome::BlockPassedNotIncluded => f.write_str("BlockPassedNotIncluded"),
            Outcome::AccountNonceTooHigh => f.write_str("AccountNonceTooHigh"),
            Outcome::SimulationFailed(reason) => write!(f, "SimulationFailed({})", reason),
            Outcome::RelaySubmissionFailed(reason) => write!(f, "RelaySubmissionFailed({})", reason),
            Outcome::Unknown(reason) => write!(f, "Unknown({})", reason),
            Outcome::SimulationPassed => f.write_str("SimulationPassed"),
        }
    }
}
