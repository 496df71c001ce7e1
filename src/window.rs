pub mod host;
pub mod main;
pub mod preview;
pub mod registry;

use serde::{Deserialize, Serialize};

// ============================================================================
// Point type
// ============================================================================

/// A 2D point or offset in logical units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

// ============================================================================
// Rect type
// ============================================================================

/// Axis-aligned rectangle (origin at top-left)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Half-open containment check: left/top edges are inside, right/bottom are not
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left()
            && point.x < self.right()
            && point.y >= self.top()
            && point.y < self.bottom()
    }

    /// Grow the rectangle by `padding` on every side
    pub fn inflate(&self, padding: f64) -> Rect {
        Rect::new(
            self.x - padding,
            self.y - padding,
            self.width + padding * 2.0,
            self.height + padding * 2.0,
        )
    }

    pub fn with_origin(&self, origin: Point) -> Rect {
        Rect::new(origin.x, origin.y, self.width, self.height)
    }
}

// ============================================================================
// Tab strip geometry
// ============================================================================

/// Tab strip bounds in client coordinates (relative to the window's client area)
///
/// Tabs are laid out left to right with equal width, shrinking when they no
/// longer fit at `max_tab_width`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TabStrip {
    pub bounds: Rect,
    pub max_tab_width: f64,
}

impl TabStrip {
    pub const fn new(bounds: Rect, max_tab_width: f64) -> Self {
        Self {
            bounds,
            max_tab_width,
        }
    }

    /// Width of each tab when `tab_count` tabs are shown
    pub fn tab_width(&self, tab_count: usize) -> f64 {
        if tab_count == 0 {
            return self.max_tab_width;
        }
        (self.bounds.width / tab_count as f64).min(self.max_tab_width)
    }
}
