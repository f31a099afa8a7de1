//! Entry point from the host's trap path.

use log::{trace, warn};
use riscv::decode::decode;

use super::{Emulated, Host, TrapFrame, VirtError, VirtState};

/// Emulate the privileged instruction at `frame.pc()`.
///
/// On success the frame and the installed table reflect the emulated instruction and the guest
/// can be resumed. On error the guest is finished: `state` has been torn down back to power-on
/// and [`Host::kill_current`] has been called.
pub fn trap_and_emulate<H: Host, F: TrapFrame>(
    state: &mut VirtState,
    host: &mut H,
    frame: &mut F,
) -> Result<Emulated, VirtError> {
    let result = emulate_one(state, host, frame);
    if let Err(err) = &result {
        warn!(
            "terminating guest at pc {:#x} in {} mode: {}",
            frame.pc(),
            state.mode(),
            err
        );
        state.teardown(host);
        host.kill_current();
    }
    result
}

fn emulate_one<H: Host, F: TrapFrame>(
    state: &mut VirtState,
    host: &mut H,
    frame: &mut F,
) -> Result<Emulated, VirtError> {
    state.attach(host)?;

    let pc = frame.pc();
    let raw = host
        .fetch_instruction(pc)
        .ok_or(VirtError::FetchFault { pc })?;
    let inst = decode(raw)?;
    trace!("pc {:#x}: {:#010x} {}", pc, raw, inst.name());

    state.emulate(host, frame, inst)
}
