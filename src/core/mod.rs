//! 核心编排层：错误与恢复、状态标志、事件入口、连接监管、轮次调度、内核装配

pub mod error;
pub mod ingress;
pub mod kernel;
pub mod recovery;
pub mod scheduler;
pub mod state;
pub mod supervisor;

pub use error::KernelError;
pub use ingress::{EventIngress, IngressHandle};
pub use kernel::{AgentKernel, KernelBuilder};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use scheduler::{stream_exchange, RoundOutcome, RoundScheduler, RoundTimings, STARTUP_EVENT};
pub use state::{ActivityFlag, KernelState};
pub use supervisor::ConnectionSupervisor;
