//! Render state machine
//!
//! Replaces scattered dirty flags with one explicit state. Mutation events only mark work;
//! the work itself happens on the next draw.

/// What the next build must redo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rebuild {
    /// Rasterize and repack the sprite atlas (style change)
    pub atlas: bool,
}

/// Lifecycle of a layer's GPU data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerState {
    /// Nothing built yet; the first draw builds everything
    #[default]
    Empty,
    /// Cached buffers are stale and rebuilt on the next draw
    Building(Rebuild),
    /// Buffers match the current data and style
    Ready,
}

impl LayerState {
    /// Style rules changed
    pub fn invalidate_style(&mut self) {
        if *self != LayerState::Empty {
            *self = LayerState::Building(Rebuild { atlas: true });
        }
    }

    /// Feature data (or target zoom) changed
    pub fn invalidate_data(&mut self) {
        *self = match *self {
            LayerState::Empty => LayerState::Empty,
            LayerState::Building(rebuild) => LayerState::Building(rebuild),
            LayerState::Ready => LayerState::Building(Rebuild { atlas: false }),
        };
    }

    /// Work the upcoming draw must do first, `None` when buffers can be reused
    pub fn begin_draw(&self) -> Option<Rebuild> {
        match self {
            LayerState::Empty => Some(Rebuild { atlas: true }),
            LayerState::Building(rebuild) => Some(*rebuild),
            LayerState::Ready => None,
        }
    }

    pub fn finish_build(&mut self) {
        *self = LayerState::Ready;
    }

    /// Back to the initial state after teardown
    pub fn reset(&mut self) {
        *self = LayerState::Empty;
    }

    pub fn is_ready(&self) -> bool {
        *self == LayerState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_draw_builds_everything() {
        let mut state = LayerState::default();
        assert_eq!(state.begin_draw(), Some(Rebuild { atlas: true }));
        state.finish_build();
        assert!(state.is_ready());
        assert_eq!(state.begin_draw(), None);
    }

    #[test]
    fn test_invalidations_before_first_draw_stay_empty() {
        let mut state = LayerState::Empty;
        state.invalidate_data();
        state.invalidate_style();
        assert_eq!(state, LayerState::Empty);
    }

    #[test]
    fn test_data_change_keeps_atlas() {
        let mut state = LayerState::Ready;
        state.invalidate_data();
        assert_eq!(state.begin_draw(), Some(Rebuild { atlas: false }));
    }

    #[test]
    fn test_style_change_coalesces() {
        let mut state = LayerState::Ready;
        state.invalidate_style();
        state.invalidate_data();
        state.invalidate_style();
        assert_eq!(state, LayerState::Building(Rebuild { atlas: true }));
        state.finish_build();
        state.reset();
        assert_eq!(state, LayerState::Empty);
    }
}
