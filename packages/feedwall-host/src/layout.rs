//! Slot geometry.

/// Source of the current viewport width, read each time a row is laid out.
pub trait Viewport {
    fn width(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedViewport(pub f64);

impl Viewport for FixedViewport {
    fn width(&self) -> f64 {
        self.0
    }
}

/// A fixed display region, addressed by its center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutSlot {
    pub center_x: i32,
    pub center_y: i32,
    pub width: u32,
    pub height: u32,
}

/// Top-left placement of a slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotRect {
    pub left: f64,
    pub top: f64,
    pub width: u32,
    pub height: u32,
}

impl LayoutSlot {
    pub fn rect(&self) -> SlotRect {
        SlotRect {
            left: f64::from(self.center_x) - f64::from(self.width) / 2.0,
            top: f64::from(self.center_y) - f64::from(self.height) / 2.0,
            width: self.width,
            height: self.height,
        }
    }
}

pub struct LayoutBuilder<'v> {
    viewport: &'v dyn Viewport,
    item_width: u32,
    item_height: u32,
    slots: Vec<LayoutSlot>,
}

impl<'v> LayoutBuilder<'v> {
    pub fn new(viewport: &'v dyn Viewport, item_width: u32, item_height: u32) -> Self {
        Self {
            viewport,
            item_width,
            item_height,
            slots: Vec::new(),
        }
    }

    /// Append `n_cols` slots spread over `n_cols + 1` equal intervals of the
    /// viewport width as it is right now.
    pub fn add_row(mut self, n_cols: u32, center_y: i32) -> Self {
        let interval = self.viewport.width() / f64::from(n_cols + 1);
        self.slots.extend((0..n_cols).map(|i| LayoutSlot {
            center_x: (interval * f64::from(i + 1)).floor() as i32,
            center_y,
            width: self.item_width,
            height: self.item_height,
        }));
        self
    }

    /// Slots in row-major order.
    pub fn build(self) -> Vec<LayoutSlot> {
        self.slots
    }
}

/// Layouts bound to the number keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutPreset {
    /// `1`: two rows of five.
    TwoRowsOfFive,
    /// `2`: five over four.
    FiveOverFour,
    /// `3`: a single large portrait.
    Spotlight,
}

impl LayoutPreset {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            '1' => Some(Self::TwoRowsOfFive),
            '2' => Some(Self::FiveOverFour),
            '3' => Some(Self::Spotlight),
            _ => None,
        }
    }

    pub fn build(self, viewport: &dyn Viewport) -> Vec<LayoutSlot> {
        match self {
            Self::TwoRowsOfFive => LayoutBuilder::new(viewport, 200, 300)
                .add_row(5, 200)
                .add_row(5, 550)
                .build(),
            Self::FiveOverFour => LayoutBuilder::new(viewport, 200, 300)
                .add_row(5, 200)
                .add_row(4, 550)
                .build(),
            Self::Spotlight => LayoutBuilder::new(viewport, 400, 600)
                .add_row(1, 375)
                .build(),
        }
    }
}
