use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutOptions {
    /// Fixed row count for the message list; `None` lets it grow with the terminal.
    pub message_pane_height: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// Optional cosmetic adjustment the host may run once before the first frame.
pub trait StartupHook {
    fn name(&self) -> &'static str;
    fn apply(&self, layout: &mut LayoutOptions) -> Result<(), HookError>;
}

/// Keeps the message pane from resizing by a row between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMessagePaneHeight(pub u16);

impl StartupHook for PinMessagePaneHeight {
    fn name(&self) -> &'static str {
        "pin-message-pane-height"
    }

    fn apply(&self, layout: &mut LayoutOptions) -> Result<(), HookError> {
        if self.0 == 0 {
            return Err(HookError("message pane height must be positive".to_string()));
        }
        layout.message_pane_height = Some(self.0);
        Ok(())
    }
}

/// Each hook edits a copy that is committed only on success, so a failed
/// hook leaves no partial change. Returns how many hooks applied.
pub fn run_startup_hooks(hooks: &[Box<dyn StartupHook>], layout: &mut LayoutOptions) -> usize {
    let mut applied = 0;
    for hook in hooks {
        let mut candidate = *layout;
        match hook.apply(&mut candidate) {
            Ok(()) => {
                *layout = candidate;
                applied += 1;
            }
            Err(err) => debug!(hook = hook.name(), error = %err, "startup hook failed; ignoring"),
        }
    }
    applied
}
