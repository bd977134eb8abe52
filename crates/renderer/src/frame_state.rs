//! The frame lifecycle state machine.
//!
//! ```text
//!            new_frame                execute_command_list          end_frame
//!   Idle ─────────────────▶ Recording(Frame) ─────────────▶ Submitted(Frame) ─────────▶ Idle
//!     │  reset_command_list                                                flush
//!     └─────────────────▶ Recording(Upload) ─────────────▶ Submitted(Upload) ─────────▶ Idle
//! ```
//!
//! Every public renderer operation is gated on [`FrameState::after`]. `Lost`
//! is terminal and reachable from any state when the device is removed.

use std::fmt;

/// What a command list recording is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    /// A frame that ends in a present.
    Frame,
    /// Ad hoc work such as resource uploads, completed by a flush.
    Upload,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrameState {
    #[default]
    Idle,
    Recording(Pass),
    Submitted(Pass),
    /// The device was removed. Terminal.
    Lost,
}

/// Renderer operations whose legality depends on the frame state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    NewFrame,
    ResetCommandList,
    ExecuteCommandList,
    EndFrame,
    FlushCommandQueue,
    UpdatePassConstants,
    CommandList,
    SetSize,
    SetFullScreen,
    AddDescriptor,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::NewFrame => "new_frame",
            Operation::ResetCommandList => "reset_command_list",
            Operation::ExecuteCommandList => "execute_command_list",
            Operation::EndFrame => "end_frame",
            Operation::FlushCommandQueue => "flush_command_queue",
            Operation::UpdatePassConstants => "update_pass_constants",
            Operation::CommandList => "command_list",
            Operation::SetSize => "set_size",
            Operation::SetFullScreen => "set_full_screen",
            Operation::AddDescriptor => "descriptor registration",
        }
    }
}

impl FrameState {
    /// The state `operation` leads to, or `None` if it is not allowed now.
    pub fn after(self, operation: Operation) -> Option<FrameState> {
        use FrameState::*;
        use Operation::*;

        match (self, operation) {
            (Lost, _) => None,
            (Idle, NewFrame) => Some(Recording(Pass::Frame)),
            (Idle, ResetCommandList) => Some(Recording(Pass::Upload)),
            (Recording(pass), ExecuteCommandList) => Some(Submitted(pass)),
            (Submitted(Pass::Frame), EndFrame) => Some(Idle),
            (Submitted(Pass::Upload), FlushCommandQueue) => Some(Idle),
            (state, FlushCommandQueue) => Some(state),
            (Idle | Recording(_), UpdatePassConstants) => Some(self),
            (Recording(_), CommandList) => Some(self),
            (Idle, SetSize | SetFullScreen) => Some(Idle),
            (state, AddDescriptor) => Some(state),
            _ => None,
        }
    }

    pub fn is_idle(self) -> bool {
        self == FrameState::Idle
    }

    pub fn is_recording(self) -> bool {
        matches!(self, FrameState::Recording(_))
    }

    pub fn is_lost(self) -> bool {
        self == FrameState::Lost
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameState::Idle => f.write_str("idle"),
            FrameState::Recording(Pass::Frame) => f.write_str("recording a frame"),
            FrameState::Recording(Pass::Upload) => f.write_str("recording an upload"),
            FrameState::Submitted(Pass::Frame) => f.write_str("a frame is submitted"),
            FrameState::Submitted(Pass::Upload) => f.write_str("an upload is submitted"),
            FrameState::Lost => f.write_str("the device is lost"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_OPERATIONS: [Operation; 10] = [
        Operation::NewFrame,
        Operation::ResetCommandList,
        Operation::ExecuteCommandList,
        Operation::EndFrame,
        Operation::FlushCommandQueue,
        Operation::UpdatePassConstants,
        Operation::CommandList,
        Operation::SetSize,
        Operation::SetFullScreen,
        Operation::AddDescriptor,
    ];

    #[test]
    fn test_frame_cycle() {
        let state = FrameState::Idle;
        let state = state.after(Operation::NewFrame).unwrap();
        assert_eq!(state, FrameState::Recording(Pass::Frame));
        let state = state.after(Operation::ExecuteCommandList).unwrap();
        assert_eq!(state, FrameState::Submitted(Pass::Frame));
        assert!(state.after(Operation::NewFrame).is_none());
        let state = state.after(Operation::EndFrame).unwrap();
        assert!(state.is_idle());
    }

    #[test]
    fn test_upload_cycle_ends_with_flush() {
        let state = FrameState::Idle.after(Operation::ResetCommandList).unwrap();
        let state = state.after(Operation::ExecuteCommandList).unwrap();
        assert_eq!(state, FrameState::Submitted(Pass::Upload));
        assert!(state.after(Operation::EndFrame).is_none());
        assert_eq!(
            state.after(Operation::FlushCommandQueue),
            Some(FrameState::Idle)
        );
    }

    #[test]
    fn test_flush_keeps_other_states() {
        for state in [
            FrameState::Idle,
            FrameState::Recording(Pass::Frame),
            FrameState::Submitted(Pass::Frame),
        ] {
            assert_eq!(state.after(Operation::FlushCommandQueue), Some(state));
        }
    }

    #[test]
    fn test_pass_constants_rejected_while_submitted() {
        assert!(
            FrameState::Submitted(Pass::Frame)
                .after(Operation::UpdatePassConstants)
                .is_none()
        );
        assert!(
            FrameState::Recording(Pass::Upload)
                .after(Operation::UpdatePassConstants)
                .is_some()
        );
    }

    #[test]
    fn test_resize_only_when_idle() {
        assert!(FrameState::Idle.after(Operation::SetSize).is_some());
        assert!(
            FrameState::Recording(Pass::Frame)
                .after(Operation::SetFullScreen)
                .is_none()
        );
    }

    #[test]
    fn test_lost_is_terminal() {
        for operation in ALL_OPERATIONS {
            assert!(FrameState::Lost.after(operation).is_none());
        }
    }

    fn operation() -> impl Strategy<Value = Operation> {
        proptest::sample::select(ALL_OPERATIONS.to_vec())
    }

    proptest! {
        #[test]
        fn prop_command_list_exists_only_while_recording(ops in proptest::collection::vec(operation(), 0..64)) {
            let mut state = FrameState::Idle;
            for op in ops {
                if let Some(next) = state.after(op) {
                    state = next;
                }
                prop_assert_eq!(state.after(Operation::CommandList).is_some(), state.is_recording());
                prop_assert!(!state.is_lost());
            }
        }
    }
}
