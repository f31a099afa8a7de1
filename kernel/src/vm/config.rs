/// A guest-physical range over which emulated PMP settings are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionWindow {
    pub start: u64,
    pub size: u64,
}

impl ProtectionWindow {
    pub const fn new(start: u64, size: u64) -> Self {
        Self { start, size }
    }

    /// One past the last byte of the window.
    pub const fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }
}

/// Knobs of the virtualization layer, copied into every [`super::VirtState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtConfig {
    /// Guest memory governed by the emulated `pmpcfg0`/`pmpaddr0` pair.
    pub window: ProtectionWindow,
    /// Power-on value of `mvendorid`.
    pub vendor_id: u64,
    /// Reject writes to CSRs whose address marks them read-only.
    pub enforce_read_only: bool,
    /// Terminate the guest once its `mvendorid` holds 0.
    pub exit_on_vendor_id_zero: bool,
}

/// Guest RAM starts here.
pub const DEFAULT_WINDOW_START: u64 = 0x8000_0000;
/// 4 MiB.
pub const DEFAULT_WINDOW_SIZE: u64 = 0x40_0000;
/// ASCII "omphal".
pub const DEFAULT_VENDOR_ID: u64 = 0x6f6d_7068_616c;

impl VirtConfig {
    pub const fn new() -> Self {
        Self {
            window: ProtectionWindow::new(DEFAULT_WINDOW_START, DEFAULT_WINDOW_SIZE),
            vendor_id: DEFAULT_VENDOR_ID,
            enforce_read_only: true,
            exit_on_vendor_id_zero: true,
        }
    }

    pub const fn with_window(mut self, start: u64, size: u64) -> Self {
        self.window = ProtectionWindow::new(start, size);
        self
    }

    pub const fn with_vendor_id(mut self, vendor_id: u64) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    pub const fn with_read_only_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_read_only = enforce;
        self
    }

    pub const fn with_vendor_id_exit(mut self, exit: bool) -> Self {
        self.exit_on_vendor_id_zero = exit;
        self
    }
}

impl Default for VirtConfig {
    fn default() -> Self {
        Self::new()
    }
}
