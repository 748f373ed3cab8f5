//! Pool of per-segmentation color lookup tables.
//!
//! Every live segmentation owns exactly one slot. Freed slots are handed out
//! again lowest-first, so sessions that add and remove segmentations for a
//! long time keep reusing small indices.

pub type Rgb = [u8; 3];
pub type Rgba = [u8; 4];

/// Number of entries in a table. Entry 0 is background and stays transparent.
pub const COLOR_LUT_SIZE: usize = 256;

const DEFAULT_SEGMENT_COLORS: [Rgb; 16] = [
    [221, 84, 84],
    [77, 228, 121],
    [166, 70, 235],
    [189, 180, 116],
    [109, 182, 196],
    [204, 101, 157],
    [123, 211, 94],
    [93, 87, 218],
    [225, 128, 80],
    [73, 232, 172],
    [181, 119, 186],
    [176, 193, 112],
    [105, 153, 200],
    [89, 230, 239],
    [242, 196, 92],
    [144, 104, 89],
];

/// Default color of a segment index, cycling through the built-in palette.
pub fn default_segment_color(segment_index: u32) -> Rgb {
    if segment_index == 0 {
        return [0, 0, 0];
    }
    let slot = (segment_index as usize - 1) % DEFAULT_SEGMENT_COLORS.len();
    DEFAULT_SEGMENT_COLORS[slot]
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorLut {
    entries: Vec<Rgba>,
}

impl Default for ColorLut {
    fn default() -> Self {
        let entries = (0..COLOR_LUT_SIZE as u32)
            .map(|index| {
                if index == 0 {
                    [0, 0, 0, 0]
                } else {
                    let [r, g, b] = default_segment_color(index);
                    [r, g, b, 255]
                }
            })
            .collect();
        Self { entries }
    }
}

impl ColorLut {
    pub fn color(&self, segment_index: u32) -> Option<Rgba> {
        self.entries.get(segment_index as usize).copied()
    }

    /// Overwrites one entry, growing the table when the index lies past its end.
    pub fn set_color(&mut self, segment_index: u32, color: Rgba) {
        let index = segment_index as usize;
        if index >= self.entries.len() {
            self.entries.resize(index + 1, [0, 0, 0, 0]);
        }
        self.entries[index] = color;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ColorLutAllocator {
    slots: Vec<Option<ColorLut>>,
}

impl ColorLutAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the lowest free index and fills it with the default table.
    pub fn allocate(&mut self) -> usize {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.slots.len());

        if index == self.slots.len() {
            self.slots.push(Some(ColorLut::default()));
        } else {
            self.slots[index] = Some(ColorLut::default());
        }
        log::debug!("Allocated color LUT {index}");
        index
    }

    /// Frees an index. Returns `false` if it was not allocated.
    pub fn release(&mut self, index: usize) -> bool {
        match self.slots.get_mut(index) {
            Some(slot @ Some(_)) => {
                *slot = None;
                // Keep the pool from growing without bound on trailing frees.
                while matches!(self.slots.last(), Some(None)) {
                    self.slots.pop();
                }
                log::debug!("Released color LUT {index}");
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&ColorLut> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ColorLut> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub fn is_allocated(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
