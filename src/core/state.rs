//! 内核活动状态：Dormant / Active 二值标志
//!
//! 仅由连接监管写入、主循环读取；单写者，原子读写即可，无需 CAS。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 内核是否可用
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelState {
    /// 无可用凭据，后端未连接
    Dormant,
    /// 后端已连接到最近一次应用的配置
    Active,
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelState::Dormant => f.write_str("dormant"),
            KernelState::Active => f.write_str("active"),
        }
    }
}

/// 共享的状态标志，克隆后指向同一份存储；初始为 Dormant
#[derive(Clone, Debug, Default)]
pub struct ActivityFlag(Arc<AtomicBool>);

impl ActivityFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> KernelState {
        if self.0.load(Ordering::Acquire) {
            KernelState::Active
        } else {
            KernelState::Dormant
        }
    }

    pub fn is_active(&self) -> bool {
        self.get() == KernelState::Active
    }

    /// 写入新状态，返回旧状态
    pub fn set(&self, state: KernelState) -> KernelState {
        let previous = self.0.swap(state == KernelState::Active, Ordering::AcqRel);
        if previous {
            KernelState::Active
        } else {
            KernelState::Dormant
        }
    }
}
