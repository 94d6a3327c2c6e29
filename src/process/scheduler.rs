//! Per-CPU preemptive scheduler
//!
//! Each CPU owns a run queue of READY tasks behind its own spinlock; the
//! running task is kept off the queue. `schedule()` picks the
//! highest-priority READY task (queue order breaks ties), falls back to
//! the CPU's idle task, and context-switches if the choice differs from
//! the current task.
//!
//! Preemption points are explicit `yield_now()`/`schedule()` calls and,
//! once an interrupt controller is wired up, the timer tick (a tick is
//! defined as "call `schedule()`"). The run-queue lock is never held
//! across a context switch.

use super::task::{self, Task};
use super::{Pid, TaskError, TaskState};
use crate::smp::{self, MAX_CPUS};
use crate::sync::SpinLock;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::ptr;

/// Raw task pointer that can live in per-CPU structures.
///
/// Validity: tasks are never freed (exit handling is out of scope), so a
/// registered pointer stays good for the kernel's lifetime.
pub(crate) struct TaskPtr(pub *mut Task);

unsafe impl Send for TaskPtr {}

struct CpuRunQueue {
    cpu: usize,
    current: *mut Task,
    idle: *mut Task,
    queue: VecDeque<TaskPtr>,
    schedule_count: u64,
}

unsafe impl Send for CpuRunQueue {}

const fn run_queue(cpu: usize) -> SpinLock<CpuRunQueue> {
    SpinLock::new(CpuRunQueue {
        cpu,
        current: ptr::null_mut(),
        idle: ptr::null_mut(),
        queue: VecDeque::new(),
        schedule_count: 0,
    })
}

static RUN_QUEUES: [SpinLock<CpuRunQueue>; MAX_CPUS] =
    [run_queue(0), run_queue(1), run_queue(2), run_queue(3)];

/// All tasks ever created, for PID lookup. Tasks are never removed.
static TASKS: SpinLock<Vec<TaskPtr>> = SpinLock::new(Vec::new());

/// Idle loop: wait for an event, then see if anything became runnable.
///
/// Runs at EL1 with interrupts masked (first-run SPSR) and keeps them
/// masked; wakeups arrive as events (`sev` from task creation/wakeup),
/// not interrupts, until the interrupt controller exists.
extern "C" fn idle_task_entry() -> ! {
    loop {
        crate::arch::wfe();
        schedule();
    }
}

/// Phase one of scheduler bring-up: per-CPU queues exist statically, so
/// this only announces the fact. No tasks are created here.
pub fn init() {
    crate::info!("Scheduler: {} per-CPU run queues ready", MAX_CPUS);
}

/// Phase two: create the idle task for `cpu` out of static storage.
///
/// Statically-reserved memory, not the heap: during early boot a heap
/// lock acquisition could still race with the interrupt plumbing.
pub fn init_cpu(cpu: usize) {
    assert!(cpu < MAX_CPUS, "no such CPU: {}", cpu);

    let idle = unsafe { task::init_idle(cpu, idle_task_entry) };

    let mut rq = RUN_QUEUES[cpu].lock_irqsave();
    rq.idle = idle;
    drop(rq);

    crate::info!("Scheduler: CPU {} idle task installed", cpu);
}

/// Pop the highest-priority READY task; queue position breaks ties.
/// Zombies encountered on the way are dropped from the queue.
fn pick_next(queue: &mut VecDeque<TaskPtr>) -> Option<*mut Task> {
    queue.retain(|t| unsafe { (*t.0).state != TaskState::Zombie });

    let mut best: Option<(usize, u8)> = None;
    for (i, t) in queue.iter().enumerate() {
        let task = unsafe { &*t.0 };
        if task.state != TaskState::Ready {
            continue;
        }
        match best {
            Some((_, prio)) if prio >= task.priority => {}
            _ => best = Some((i, task.priority)),
        }
    }

    best.and_then(|(i, _)| queue.remove(i)).map(|t| t.0)
}

/// Create a task and enqueue it on exactly one CPU's run queue.
///
/// An affinity mask of zero means "the current CPU"; otherwise the
/// lowest-index CPU in the mask is chosen. The name is truncated to fit.
pub fn task_create(
    name: &str,
    entry: extern "C" fn() -> !,
    priority: u8,
    affinity: u64,
) -> Result<Pid, TaskError> {
    let cpu = if affinity == 0 {
        crate::arch::cpu_index()
    } else {
        let cpu = affinity.trailing_zeros() as usize;
        if cpu >= MAX_CPUS {
            return Err(TaskError::InvalidAffinity);
        }
        cpu
    };

    let task = task::new_task(name, entry, priority, affinity, cpu)?;
    let pid = unsafe { (*task).pid };

    TASKS.lock_irqsave().push(TaskPtr(task));
    RUN_QUEUES[cpu].lock_irqsave().queue.push_back(TaskPtr(task));

    // Nudge a wfe-parked idle CPU
    crate::arch::sev();

    crate::debug!(
        "Scheduler: task '{}' pid {} priority {} on CPU {}",
        name,
        pid,
        priority,
        cpu
    );

    Ok(pid)
}

/// Pick and switch to the next task on this CPU.
///
/// Safe to call from any kernel context that holds no spinlock; IRQs are
/// masked for the duration. Panics if called before this CPU's idle task
/// exists.
pub fn schedule() {
    // Held (not dropped) across the switch; a first-run task leaves
    // through eret with its own SPSR and unmasks itself
    let _irq = crate::sync::IrqGuard::new();
    let cpu = crate::arch::cpu_index();

    let mut rq = RUN_QUEUES[cpu].lock();
    if rq.idle.is_null() {
        panic!("schedule on CPU {} before its idle task exists", rq.cpu);
    }
    rq.schedule_count += 1;

    let prev = rq.current;
    let idle = rq.idle;
    let next = pick_next(&mut rq.queue).unwrap_or(idle);

    unsafe {
        if !prev.is_null() && (*prev).state == TaskState::Running {
            (*prev).state = TaskState::Ready;
            if prev != idle && prev != next {
                rq.queue.push_back(TaskPtr(prev));
            }
        }
        (*next).state = TaskState::Running;
    }
    rq.current = next;
    let work_left = !rq.queue.is_empty();

    // Lock must not be held across the switch
    drop(rq);

    if work_left {
        // Keep wfe-parked idle loops from sleeping past runnable work
        crate::arch::sev();
    }

    if prev != next {
        unsafe {
            crate::debug!(
                "Scheduler: CPU {} -> '{}' pid {}",
                cpu,
                (*next).name(),
                (*next).pid
            );
            crate::arch::context::context_switch(prev, next);
        }
    }
}

/// Voluntarily give up the CPU.
pub fn yield_now() {
    schedule();
}

/// Put the current task into `state` (BLOCKED or ZOMBIE) and reschedule.
/// Returns when the task runs again, i.e. after a matching
/// [`task_wakeup`].
pub fn task_block(state: TaskState) {
    debug_assert!(matches!(state, TaskState::Blocked | TaskState::Zombie));

    let cpu = crate::arch::cpu_index();
    {
        let rq = RUN_QUEUES[cpu].lock_irqsave();
        let current = rq.current;
        if current.is_null() || current == rq.idle {
            panic!("cannot block the idle task on CPU {}", rq.cpu);
        }
        unsafe {
            (*current).state = state;
        }
    }

    schedule();
}

/// Move a blocked task back to READY on its owning CPU's queue. A wakeup
/// for a remote CPU also raises a reschedule IPI there.
pub fn task_wakeup(pid: Pid) {
    let task = {
        let tasks = TASKS.lock_irqsave();
        tasks
            .iter()
            .find(|t| unsafe { (*t.0).pid } == pid)
            .map(|t| t.0)
    };

    let Some(task) = task else {
        crate::warn!("Scheduler: wakeup for unknown pid {}", pid);
        return;
    };

    let cpu = unsafe { (*task).cpu };
    let mut woke = false;
    {
        let mut rq = RUN_QUEUES[cpu].lock_irqsave();
        unsafe {
            if (*task).state == TaskState::Blocked {
                (*task).state = TaskState::Ready;
                rq.queue.push_back(TaskPtr(task));
                woke = true;
            }
        }
    }

    if woke {
        crate::arch::sev();
        if cpu != crate::arch::cpu_index() {
            smp::ipi::send_reschedule(cpu);
        }
    }
}

/// Hand this CPU over to the scheduler. The boot stack is abandoned; the
/// idle task starts on its own stack and the call never returns.
pub fn enter() -> ! {
    crate::arch::irq_disable();
    let cpu = crate::arch::cpu_index();

    let idle;
    {
        let mut rq = RUN_QUEUES[cpu].lock();
        idle = rq.idle;
        if idle.is_null() {
            panic!("scheduler entered on CPU {} before its idle task exists", rq.cpu);
        }
        rq.current = idle;
        unsafe {
            (*idle).state = TaskState::Running;
        }
    }

    crate::info!("Scheduler: CPU {} entering idle loop", cpu);
    unsafe {
        crate::arch::context::context_switch(ptr::null_mut(), idle);
    }
    unreachable!("scheduler enter returned")
}

/// Times `schedule()` ran on `cpu` (diagnostics).
pub fn schedule_count(cpu: usize) -> u64 {
    RUN_QUEUES[cpu].lock_irqsave().schedule_count
}

/// Log one line per known task (diagnostics).
pub fn dump_tasks() {
    let tasks = TASKS.lock_irqsave();
    for t in tasks.iter() {
        let task = unsafe { &*t.0 };
        crate::info!(
            "  pid {} '{}' {:?} prio {} cpu {} affinity {:#x} started={} entry {:#x} sp {:#x}/{:#x} usp {:#x}",
            task.pid,
            task.name(),
            task.state,
            task.priority,
            task.cpu,
            task.affinity,
            task.has_started(),
            task.entry,
            task.stack_top,
            task.kernel_stack_base,
            task.user_stack_top
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;

    fn ready_task(pid: Pid, priority: u8) -> *mut Task {
        let mut t = Box::new(Task::empty());
        t.pid = pid;
        t.priority = priority;
        t.state = TaskState::Ready;
        Box::into_raw(t)
    }

    fn drain(queue: &mut VecDeque<TaskPtr>) {
        while let Some(t) = queue.pop_front() {
            drop(unsafe { Box::from_raw(t.0) });
        }
    }

    #[test]
    fn test_pick_highest_priority() {
        let mut queue = VecDeque::new();
        queue.push_back(TaskPtr(ready_task(1, 50)));
        queue.push_back(TaskPtr(ready_task(2, 200)));
        queue.push_back(TaskPtr(ready_task(3, 100)));

        let picked = pick_next(&mut queue).unwrap();
        assert_eq!(unsafe { (*picked).pid }, 2);

        drop(unsafe { Box::from_raw(picked) });
        drain(&mut queue);
    }

    #[test]
    fn test_queue_position_breaks_ties() {
        let mut queue = VecDeque::new();
        queue.push_back(TaskPtr(ready_task(1, 100)));
        queue.push_back(TaskPtr(ready_task(2, 100)));

        let picked = pick_next(&mut queue).unwrap();
        assert_eq!(unsafe { (*picked).pid }, 1);

        drop(unsafe { Box::from_raw(picked) });
        drain(&mut queue);
    }

    #[test]
    fn test_zombies_are_discarded() {
        let mut queue = VecDeque::new();
        let zombie = ready_task(1, 255);
        unsafe { (*zombie).state = TaskState::Zombie };
        queue.push_back(TaskPtr(zombie));
        queue.push_back(TaskPtr(ready_task(2, 10)));

        let picked = pick_next(&mut queue).unwrap();
        assert_eq!(unsafe { (*picked).pid }, 2);
        assert!(queue.is_empty());
        assert!(pick_next(&mut queue).is_none());

        drop(unsafe { Box::from_raw(picked) });
    }
}
