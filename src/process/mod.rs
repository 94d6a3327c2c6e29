//! Task management and per-CPU scheduling

pub mod scheduler;
pub mod task;

/// Task identifier. PID 0 is reserved for the per-CPU idle tasks.
pub type Pid = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    Zombie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// Task structure or stack allocation failed
    OutOfMemory,
    /// Affinity mask selects no CPU this kernel knows about
    InvalidAffinity,
}
