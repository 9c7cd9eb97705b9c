//! Where slot contents end up.

use std::io::Write;

use crate::layout::LayoutSlot;
use crate::resources::AvatarCache;

/// Horizontal pixels represented by one terminal column.
const PIXELS_PER_COLUMN: f64 = 8.0;

/// Displayed state of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSlot {
    pub slot: LayoutSlot,
    /// Avatar URL currently shown, if any tick has been applied.
    pub image: Option<String>,
    pub labels: Vec<String>,
}

impl BoundSlot {
    pub fn new(slot: LayoutSlot) -> Self {
        Self {
            slot,
            image: None,
            labels: Vec::new(),
        }
    }
}

pub trait DisplaySurface {
    /// Replace whatever is shown with the given (empty) slots.
    fn mount(&mut self, slots: &[BoundSlot]);

    /// Show the slots' current contents.
    fn render(&mut self, slots: &[BoundSlot]);

    fn clear(&mut self);

    /// Images the module expects to show soon.
    fn preload(&mut self, _urls: &[String]) {}

    fn show_seed(&mut self, _seed: &str) {}

    fn show_error(&mut self, _message: &str) {}
}

/// Plain-text renderer: one line per layout row, each cell starting at the
/// column of its slot's left edge and showing the avatar's file name, or its
/// label once the session completed.
///
/// With an [`AvatarCache`] attached, images that were not preloaded are
/// flagged with a trailing `?`.
pub struct TerminalSurface<W> {
    out: W,
    cell_width: usize,
    avatars: Option<AvatarCache>,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            cell_width: 24,
            avatars: None,
        }
    }

    pub fn with_avatars(mut self, avatars: AvatarCache) -> Self {
        self.avatars = Some(avatars);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(err) = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush()) {
            tracing::warn!(%err, "terminal write failed");
        }
    }

    fn column(slot: &LayoutSlot) -> usize {
        (slot.rect().left.max(0.0) / PIXELS_PER_COLUMN).round() as usize
    }

    fn cell_text(&self, bound: &BoundSlot) -> String {
        let text = match (bound.labels.last(), &bound.image) {
            (Some(label), _) => label.clone(),
            (None, Some(url)) => {
                let name = url.rsplit('/').next().unwrap_or(url.as_str());
                match &self.avatars {
                    Some(cache) if !cache.contains(url) => format!("{name}?"),
                    _ => name.to_string(),
                }
            }
            (None, None) => "·".to_string(),
        };
        text.chars().take(self.cell_width - 1).collect()
    }

    fn frame(&self, slots: &[BoundSlot]) -> String {
        let mut frame = String::new();
        let mut row_y = None;
        let mut line_len = 0;
        for bound in slots {
            if row_y != Some(bound.slot.center_y) {
                if row_y.is_some() {
                    frame.push('\n');
                }
                row_y = Some(bound.slot.center_y);
                line_len = 0;
            }
            // Overlapping cells still get one column of separation.
            let pad = match Self::column(&bound.slot).checked_sub(line_len) {
                Some(pad) if pad > 0 || line_len == 0 => pad,
                _ => 1,
            };
            let text = self.cell_text(bound);
            frame.extend(std::iter::repeat(' ').take(pad));
            frame.push_str(&text);
            line_len += pad + text.chars().count();
        }
        frame.push('\n');
        frame
    }
}

impl<W: Write> DisplaySurface for TerminalSurface<W> {
    fn mount(&mut self, slots: &[BoundSlot]) {
        let rows = {
            let mut ys: Vec<i32> = slots.iter().map(|s| s.slot.center_y).collect();
            ys.dedup();
            ys.len()
        };
        let span = slots
            .iter()
            .map(|s| s.slot.rect())
            .fold(None, |acc: Option<(f64, f64)>, r| {
                let (lo, hi) = (r.left, r.left + f64::from(r.width));
                Some(acc.map_or((lo, hi), |(a, b)| (a.min(lo), b.max(hi))))
            });
        let span = match span {
            Some((lo, hi)) => format!(", x {lo:.0}..{hi:.0}"),
            None => String::new(),
        };
        self.emit(&format!(
            "── layout: {} slots in {} rows{span} ──\n",
            slots.len(),
            rows
        ));
    }

    fn render(&mut self, slots: &[BoundSlot]) {
        let frame = self.frame(slots);
        self.emit(&format!("{frame}\n"));
    }

    fn clear(&mut self) {
        self.emit("── cleared ──\n");
    }

    fn preload(&mut self, urls: &[String]) {
        if urls.is_empty() {
            return;
        }
        let uncached = match &self.avatars {
            Some(cache) => urls.iter().filter(|u| !cache.contains(u)).count(),
            None => urls.len(),
        };
        tracing::trace!(count = urls.len(), uncached, "preload hint");
    }

    fn show_seed(&mut self, seed: &str) {
        self.emit(&format!("seed: {seed}\n"));
    }

    fn show_error(&mut self, message: &str) {
        self.emit(&format!("!! {message}\n"));
    }
}
