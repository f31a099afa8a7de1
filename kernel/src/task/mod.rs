//! Process records. Each process owns the virtualization state of the guest it runs.

use alloc::{string::String, vec::Vec};
use core::{
    cell::RefCell,
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};
use critical_section::Mutex;
use log::{info, trace};

use crate::vm::{self, Emulated, Host, TrapFrame, VirtConfig, VirtError, VirtState};

pub type ProcessId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    NoSuchProcess { pid: ProcessId },
    /// The process's guest was terminated; its record is gone.
    Virt(VirtError),
}

impl From<VirtError> for TaskError {
    fn from(err: VirtError) -> Self {
        TaskError::Virt(err)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::NoSuchProcess { pid } => write!(f, "no process with id {}", pid),
            TaskError::Virt(err) => write!(f, "guest terminated: {}", err),
        }
    }
}

impl core::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            TaskError::Virt(err) => Some(err),
            TaskError::NoSuchProcess { .. } => None,
        }
    }
}

static NEXT_PROCESS_ID: AtomicU32 = AtomicU32::new(0);
static TASK_MANAGER: Mutex<RefCell<Option<TaskManager>>> = Mutex::new(RefCell::new(None));

pub struct TaskManager {
    processes: Vec<Process>,
    current_process_id: Option<ProcessId>,
    config: VirtConfig,
}

impl TaskManager {
    pub fn new(config: VirtConfig) -> Self {
        Self {
            processes: Vec::new(),
            current_process_id: None,
            config,
        }
    }

    pub fn config(&self) -> &VirtConfig {
        &self.config
    }

    /// Register a process and make it current if nothing else is.
    pub fn create_process(&mut self, name: String) -> ProcessId {
        let process = Process::new(name);
        let id = process.id;
        info!("created process {} ({})", id, process.name);
        self.processes.push(process);
        if self.current_process_id.is_none() {
            self.current_process_id = Some(id);
        }
        id
    }

    pub fn switch_to(&mut self, id: ProcessId) -> Result<(), TaskError> {
        if !self.processes.iter().any(|p| p.id == id) {
            return Err(TaskError::NoSuchProcess { pid: id });
        }
        trace!("switched to process {}", id);
        self.current_process_id = Some(id);
        Ok(())
    }

    pub fn current_process_id(&self) -> Option<ProcessId> {
        self.current_process_id
    }

    pub fn process(&self, id: ProcessId) -> Option<&Process> {
        self.processes.iter().find(|p| p.id == id)
    }

    fn process_mut(&mut self, id: ProcessId) -> Option<&mut Process> {
        self.processes.iter_mut().find(|p| p.id == id)
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.iter()
    }

    /// Drop a process record, releasing its shadow tables if it still holds any.
    pub fn remove_process<H: Host>(&mut self, id: ProcessId, host: &mut H) -> Option<Process> {
        let index = self.processes.iter().position(|p| p.id == id)?;
        let mut process = self.processes.remove(index);
        if let Some(virt) = process.virt.as_mut() {
            virt.teardown(host);
        }
        if self.current_process_id == Some(id) {
            self.current_process_id = None;
        }
        info!("removed process {} ({})", id, process.name);
        Some(process)
    }

    /// Hand a privileged-instruction trap of process `id` to its virtualization state, creating
    /// the state on the process's first trap. A process whose guest is terminated is removed.
    pub fn handle_privileged_trap<H: Host, F: TrapFrame>(
        &mut self,
        id: ProcessId,
        host: &mut H,
        frame: &mut F,
    ) -> Result<Emulated, TaskError> {
        let config = self.config;
        let process = self
            .process_mut(id)
            .ok_or(TaskError::NoSuchProcess { pid: id })?;
        let virt = process.virt.get_or_insert_with(|| VirtState::new(config));

        let result = vm::trap_and_emulate(virt, host, frame);
        if result.is_err() {
            // the guest is already torn down and killed; forget the record
            self.remove_process(id, host);
        }
        result.map_err(TaskError::from)
    }
}

pub struct Process {
    pub id: ProcessId,
    pub name: String,
    virt: Option<VirtState>,
}

impl Process {
    fn new(name: String) -> Self {
        Self {
            id: NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed),
            name,
            virt: None,
        }
    }

    /// The guest's virtualization state, once it has trapped at least once.
    pub fn virt(&self) -> Option<&VirtState> {
        self.virt.as_ref()
    }
}

/// Create the global task manager. Returns false if it already exists.
pub fn init_task_manager(config: VirtConfig) -> bool {
    let created = critical_section::with(|cs| {
        let mut task_manager = TASK_MANAGER.borrow_ref_mut(cs);
        if task_manager.is_some() {
            return false;
        }
        task_manager.replace(TaskManager::new(config));
        true
    });
    if created {
        info!("task manager initialized");
    }
    created
}

/// Run `f` on the global task manager, or return None if it was never initialized.
pub fn with_task_manager<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut TaskManager) -> R,
{
    critical_section::with(|cs| {
        let mut task_manager = TASK_MANAGER.borrow_ref_mut(cs);
        task_manager.as_mut().map(f)
    })
}
