// Preview window management for tab detachment
//
// When a tab is dragged out past the detach threshold, a floating preview
// appears at the cursor. It follows the cursor and is closed when the drag
// returns to a tab strip, is cancelled, or is dropped (a real window replaces
// it on drop).

use std::sync::Arc;

use parking_lot::Mutex;

use super::host::{PreviewId, WindowHost};
use super::{Point, Rect};
use crate::config::DragConfig;

/// Preview window state
struct PreviewState {
    id: PreviewId,
    /// Offset from the cursor to the preview origin
    inset: Point,
}

/// At most one floating preview, owned by the drag service
pub struct DragPreview {
    host: Arc<dyn WindowHost>,
    state: Mutex<Option<PreviewState>>,
}

/// Frame of the preview (or the detached window) for a cursor position
pub fn preview_frame(cursor: Point, config: &DragConfig) -> Rect {
    Rect::new(
        cursor.x - config.preview_inset.x,
        cursor.y - config.preview_inset.y,
        config.preview_width,
        config.preview_height,
    )
}

impl DragPreview {
    pub fn new(host: Arc<dyn WindowHost>) -> Self {
        Self {
            host,
            state: Mutex::new(None),
        }
    }

    /// Create the preview at the cursor. Does nothing if one is already shown.
    pub fn show(&self, title: &str, cursor: Point, config: &DragConfig) -> Option<PreviewId> {
        let mut state = self.state.lock();
        if let Some(existing) = state.as_ref() {
            return Some(existing.id);
        }

        match self.host.create_preview(title, preview_frame(cursor, config)) {
            Ok(id) => {
                tracing::debug!(%id, "Drag preview created");
                *state = Some(PreviewState {
                    id,
                    inset: config.preview_inset,
                });
                Some(id)
            }
            Err(e) => {
                tracing::warn!(%e, "Failed to create drag preview");
                None
            }
        }
    }

    /// Follow the cursor
    pub fn update_position(&self, cursor: Point) {
        if let Some(preview) = self.state.lock().as_ref() {
            let origin = Point::new(cursor.x - preview.inset.x, cursor.y - preview.inset.y);
            self.host.move_preview(preview.id, origin);
        }
    }

    /// Destroy the preview if one is shown
    pub fn close(&self) {
        if let Some(preview) = self.state.lock().take() {
            tracing::debug!(id = %preview.id, "Drag preview closed");
            self.host.destroy_preview(preview.id);
        }
    }

    pub fn id(&self) -> Option<PreviewId> {
        self.state.lock().as_ref().map(|preview| preview.id)
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::host::HeadlessHost;

    #[test]
    fn test_show_is_idempotent_and_close_destroys() {
        let host = HeadlessHost::new(Rect::new(0.0, 0.0, 1920.0, 1080.0));
        let preview = DragPreview::new(host.clone());
        let config = DragConfig::default();

        let first = preview.show("docs", Point::new(200.0, 100.0), &config).unwrap();
        let second = preview.show("docs", Point::new(300.0, 100.0), &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(host.previews().len(), 1);
        assert_eq!(host.previews()[0].1.frame, Rect::new(180.0, 90.0, 320.0, 200.0));

        preview.update_position(Point::new(400.0, 300.0));
        assert_eq!(host.previews()[0].1.frame.origin(), Point::new(380.0, 290.0));

        preview.close();
        assert!(!preview.is_active());
        assert!(host.previews().is_empty());
    }

    #[test]
    fn test_update_without_preview_is_noop() {
        let host = HeadlessHost::new(Rect::new(0.0, 0.0, 1920.0, 1080.0));
        let preview = DragPreview::new(host.clone());

        preview.update_position(Point::new(10.0, 10.0));
        preview.close();
        assert!(host.calls().is_empty());
        assert_eq!(preview.id(), None);
    }
}
