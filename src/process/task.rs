//! Task structures and creation
//!
//! A task is a kernel-mode thread of control with its own kernel stack.
//! The first four fields of [`Task`] are read by the context-switch
//! assembly (`arch::context`) and are pinned to fixed offsets; keep the
//! assertions at the bottom of this file in sync with any change.
//!
//! Per-CPU idle tasks come from static storage, not the heap: they are
//! created during early boot when a heap-lock acquisition could still
//! race with the interrupt plumbing being set up.

use super::{Pid, TaskError, TaskState};
use crate::smp::MAX_CPUS;
use core::alloc::Layout;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Kernel stack size per task.
pub const KERNEL_STACK_SIZE: usize = 16 * 1024;

/// User stack size, only allocated for entry points in user space.
pub const USER_STACK_SIZE: usize = 4 * 1024 * 1024;

/// Everything above the first GiB is outside the kernel image; an entry
/// point there gets a user stack of its own.
const USER_SPACE_BASE: usize = crate::mm::BLOCK_1G;

/// Maximum length of a task name; longer names are truncated.
pub const NAME_LEN: usize = 24;

#[repr(C)]
pub struct Task {
    // -- asm-visible prefix, offsets fixed --
    /// Saved kernel stack pointer (offset 0x00)
    pub(crate) stack_top: u64,
    /// Entry point, used on first run (offset 0x08)
    pub(crate) entry: u64,
    /// 0 until the task has run once (offset 0x10)
    pub(crate) started: u64,
    /// Initial SP_EL0; 0 for kernel-only tasks (offset 0x18)
    pub(crate) user_stack_top: u64,
    // -- scheduler bookkeeping --
    pub pid: Pid,
    pub state: TaskState,
    pub priority: u8,
    pub affinity: u64,
    /// CPU whose run queue owns this task
    pub cpu: usize,
    pub name: heapless::String<NAME_LEN>,
    pub kernel_stack_base: usize,
}

const _: () = {
    assert!(core::mem::offset_of!(Task, stack_top) == 0x00);
    assert!(core::mem::offset_of!(Task, entry) == 0x08);
    assert!(core::mem::offset_of!(Task, started) == 0x10);
    assert!(core::mem::offset_of!(Task, user_stack_top) == 0x18);
};

impl Task {
    pub(crate) const fn empty() -> Self {
        Self {
            stack_top: 0,
            entry: 0,
            started: 0,
            user_stack_top: 0,
            pid: 0,
            state: TaskState::Ready,
            priority: 0,
            affinity: 0,
            cpu: 0,
            name: heapless::String::new(),
            kernel_stack_base: 0,
        }
    }

    pub fn has_started(&self) -> bool {
        self.started != 0
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

/// PID source; 0 is the idle tasks'.
static NEXT_PID: AtomicUsize = AtomicUsize::new(1);

pub(crate) fn alloc_pid() -> Pid {
    NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

// Statically-reserved idle task storage, one per CPU.

#[repr(C, align(16))]
struct IdleStack([u8; KERNEL_STACK_SIZE]);

static mut IDLE_STACKS: [IdleStack; MAX_CPUS] = [
    IdleStack([0; KERNEL_STACK_SIZE]),
    IdleStack([0; KERNEL_STACK_SIZE]),
    IdleStack([0; KERNEL_STACK_SIZE]),
    IdleStack([0; KERNEL_STACK_SIZE]),
];

static mut IDLE_TASKS: [Task; MAX_CPUS] = [
    Task::empty(),
    Task::empty(),
    Task::empty(),
    Task::empty(),
];

/// Set up the idle task for `cpu` in its static slot and return it.
///
/// # Safety
///
/// Once per CPU, during that CPU's scheduler bring-up.
pub(crate) unsafe fn init_idle(cpu: usize, entry: extern "C" fn() -> !) -> *mut Task {
    unsafe {
        let stack = core::ptr::addr_of_mut!(IDLE_STACKS[cpu].0);
        let task = core::ptr::addr_of_mut!(IDLE_TASKS[cpu]);

        (*task).stack_top = (stack as usize + KERNEL_STACK_SIZE) as u64;
        (*task).entry = entry as usize as u64;
        (*task).started = 0;
        (*task).user_stack_top = 0;
        (*task).pid = 0;
        (*task).state = TaskState::Ready;
        (*task).priority = 0;
        (*task).affinity = 1 << cpu;
        (*task).cpu = cpu;
        (*task).name = heapless::String::new();
        let _ = (*task).name.push_str("idle");

        task
    }
}

fn truncate_name(name: &str) -> heapless::String<NAME_LEN> {
    let mut out = heapless::String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Allocate and initialize a task in the READY state.
///
/// The caller (the scheduler) still has to enqueue it. Fails with
/// `OutOfMemory` if the task structure or a stack cannot be allocated;
/// nothing is leaked on failure.
pub(crate) fn new_task(
    name: &str,
    entry: extern "C" fn() -> !,
    priority: u8,
    affinity: u64,
    cpu: usize,
) -> Result<*mut Task, TaskError> {
    let stack_layout = Layout::from_size_align(KERNEL_STACK_SIZE, 16).unwrap();
    let kernel_stack = unsafe { alloc::alloc::alloc(stack_layout) };
    if kernel_stack.is_null() {
        return Err(TaskError::OutOfMemory);
    }

    // Entry points above the kernel image run with their own user stack
    let entry_addr = entry as usize;
    let user_layout = Layout::from_size_align(USER_STACK_SIZE, 16).unwrap();
    let user_stack = if entry_addr >= USER_SPACE_BASE {
        let user_stack = unsafe { alloc::alloc::alloc(user_layout) };
        if user_stack.is_null() {
            unsafe { alloc::alloc::dealloc(kernel_stack, stack_layout) };
            return Err(TaskError::OutOfMemory);
        }
        user_stack
    } else {
        core::ptr::null_mut()
    };
    let user_stack_top = if user_stack.is_null() {
        0
    } else {
        user_stack as u64 + USER_STACK_SIZE as u64
    };

    let task_layout = Layout::new::<Task>();
    let task = unsafe { alloc::alloc::alloc(task_layout) } as *mut Task;
    if task.is_null() {
        unsafe {
            if !user_stack.is_null() {
                alloc::alloc::dealloc(user_stack, user_layout);
            }
            alloc::alloc::dealloc(kernel_stack, stack_layout);
        }
        return Err(TaskError::OutOfMemory);
    }

    unsafe {
        task.write(Task {
            stack_top: kernel_stack as u64 + KERNEL_STACK_SIZE as u64,
            entry: entry_addr as u64,
            started: 0,
            user_stack_top,
            pid: alloc_pid(),
            state: TaskState::Ready,
            priority,
            affinity,
            cpu,
            name: truncate_name(name),
            kernel_stack_base: kernel_stack as usize,
        });
    }

    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_truncation() {
        let name = truncate_name("a-task-name-well-beyond-the-limit");
        assert_eq!(name.len(), NAME_LEN);
        assert!(name.starts_with("a-task-name"));
    }

    #[test]
    fn test_empty_task_is_unstarted() {
        let t = Task::empty();
        assert!(!t.has_started());
        assert_eq!(t.state, TaskState::Ready);
    }
}
