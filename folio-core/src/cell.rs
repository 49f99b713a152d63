//! Grid model: one `GridItem` per cell of a section's layout.
//!
//! A section is a grid of `NUM_COLS` columns and a variable number of rows.
//! Every position owns exactly one cell whose id is derived from its origin,
//! so ids double as the join key with persistence and never change when cells
//! are merged or unmerged.
//!
//! ```text
//!        col 1   col 2   col 3   col 4
//! row 1 │  1   │  2   │  3   │  4   │
//! row 2 │  5   │  6   │  7   │  8   │     id = (row-1) * NUM_COLS + col
//! row 3 │  9   │  10  │  11  │  12  │
//! ```
//!
//! A merged cell is an *anchor* with `row_span`/`col_span > 1`; the cells it
//! covers stay in the collection with `hidden = true`.

use serde::{Deserialize, Serialize};

use crate::ids::CellId;

// ───────────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────────

pub const NUM_COLS: u32 = 4;
pub const MIN_ROWS: u32 = 2;
/// Rows a section may grow to. Stored rows beyond this are rejected on load.
pub const MAX_ROWS: u32 = 1000;
pub const MIN_SCALE: f32 = 0.2;
pub const MAX_SCALE: f32 = 2.0;

pub const DEFAULT_FONT_FAMILY: &str = "sans-serif";
pub const TITLE_FONT_SIZE: f32 = 24.0;
pub const SUBTITLE_FONT_SIZE: f32 = 16.0;
pub const BODY_FONT_SIZE: f32 = 14.0;

/// Body text written into a text anchor when cells are merged into it.
pub const MERGE_MARKER: &str = "Merged cell";

/// Id of the cell whose origin is `(row, col)`. Both are 1-based.
#[inline]
pub fn cell_id(row: u32, col: u32) -> CellId {
    debug_assert!(row >= 1 && (1..=NUM_COLS).contains(&col));
    (row.saturating_sub(1)) * NUM_COLS + col
}

/// Like [`cell_id`] but `None` for positions outside the grid or ids that
/// would overflow.
pub fn checked_cell_id(row: u32, col: u32) -> Option<CellId> {
    if row == 0 || !(1..=NUM_COLS).contains(&col) {
        return None;
    }
    (row - 1).checked_mul(NUM_COLS)?.checked_add(col)
}

/// Inverse of [`cell_id`].
#[inline]
pub fn cell_position(id: CellId) -> (u32, u32) {
    let zero_based = id.saturating_sub(1);
    (zero_based / NUM_COLS + 1, zero_based % NUM_COLS + 1)
}

// ───────────────────────────────────────────────────────────────────
// Payload types
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    #[default]
    None,
    Text,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    #[default]
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    Bold,
    Italic,
    Underline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub content: String,
    pub visible: bool,
    pub font_size: f32,
    pub font_family: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl TextBlock {
    pub fn with_size(font_size: f32) -> Self {
        Self {
            content: String::new(),
            visible: true,
            font_size,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            bold: false,
            italic: false,
            underline: false,
        }
    }

    pub fn style(&self, style: TextStyle) -> bool {
        match style {
            TextStyle::Bold => self.bold,
            TextStyle::Italic => self.italic,
            TextStyle::Underline => self.underline,
        }
    }

    pub fn set_style(&mut self, style: TextStyle, on: bool) {
        match style {
            TextStyle::Bold => self.bold = on,
            TextStyle::Italic => self.italic = on,
            TextStyle::Underline => self.underline = on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    pub title: TextBlock,
    pub subtitle: TextBlock,
    pub body: TextBlock,
    pub vertical_align: VerticalAlign,
    pub horizontal_align: HorizontalAlign,
}

impl Default for TextPayload {
    fn default() -> Self {
        Self {
            title: TextBlock::with_size(TITLE_FONT_SIZE),
            subtitle: TextBlock::with_size(SUBTITLE_FONT_SIZE),
            body: TextBlock::with_size(BODY_FONT_SIZE),
            vertical_align: VerticalAlign::Top,
            horizontal_align: HorizontalAlign::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub url: Option<String>,
    pub offset_x: f32,
    pub offset_y: f32,
    pub scale: f32,
}

impl Default for ImagePayload {
    fn default() -> Self {
        Self {
            url: None,
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// TextField lookup table
// ───────────────────────────────────────────────────────────────────

/// One of the three text slots of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextField {
    Title = 0,
    Subtitle = 1,
    Body = 2,
}

type Accessor = fn(&TextPayload) -> &TextBlock;
type Mutator = fn(&mut TextPayload) -> &mut TextBlock;

fn title(t: &TextPayload) -> &TextBlock {
    &t.title
}
fn title_mut(t: &mut TextPayload) -> &mut TextBlock {
    &mut t.title
}
fn subtitle(t: &TextPayload) -> &TextBlock {
    &t.subtitle
}
fn subtitle_mut(t: &mut TextPayload) -> &mut TextBlock {
    &mut t.subtitle
}
fn body(t: &TextPayload) -> &TextBlock {
    &t.body
}
fn body_mut(t: &mut TextPayload) -> &mut TextBlock {
    &mut t.body
}

/// Indexed by `TextField as usize`.
const FIELD_TABLE: [(Accessor, Mutator); 3] = [
    (title as Accessor, title_mut as Mutator),
    (subtitle as Accessor, subtitle_mut as Mutator),
    (body as Accessor, body_mut as Mutator),
];

impl TextField {
    pub const ALL: [TextField; 3] = [TextField::Title, TextField::Subtitle, TextField::Body];

    pub fn block(self, payload: &TextPayload) -> &TextBlock {
        (FIELD_TABLE[self as usize].0)(payload)
    }

    pub fn block_mut(self, payload: &mut TextPayload) -> &mut TextBlock {
        (FIELD_TABLE[self as usize].1)(payload)
    }

    pub fn default_font_size(self) -> f32 {
        match self {
            TextField::Title => TITLE_FONT_SIZE,
            TextField::Subtitle => SUBTITLE_FONT_SIZE,
            TextField::Body => BODY_FONT_SIZE,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// GridItem
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridItem {
    pub id: CellId,
    pub row: u32,
    pub col: u32,
    pub row_span: u32,
    pub col_span: u32,
    pub hidden: bool,
    pub template: TemplateType,
    pub text: TextPayload,
    pub image: ImagePayload,
}

impl GridItem {
    /// Fresh cell at `(row, col)`: no template, 1×1, default text styling.
    pub fn new_default(row: u32, col: u32) -> Self {
        Self {
            id: cell_id(row, col),
            row,
            col,
            row_span: 1,
            col_span: 1,
            hidden: false,
            template: TemplateType::None,
            text: TextPayload::default(),
            image: ImagePayload::default(),
        }
    }

    /// The `NUM_COLS` default cells of one row.
    pub fn band(row: u32) -> Vec<GridItem> {
        (1..=NUM_COLS).map(|col| GridItem::new_default(row, col)).collect()
    }

    /// Every default cell of a grid with `rows` rows, in id order.
    pub fn default_band(rows: u32) -> Vec<GridItem> {
        (1..=rows).flat_map(GridItem::band).collect()
    }

    pub fn is_merged(&self) -> bool {
        self.row_span > 1 || self.col_span > 1
    }

    pub fn is_visible(&self) -> bool {
        !self.hidden
    }

    /// Last row covered by this cell's footprint.
    pub fn row_end(&self) -> u32 {
        self.row + self.row_span.max(1) - 1
    }

    /// Last column covered by this cell's footprint.
    pub fn col_end(&self) -> u32 {
        self.col + self.col_span.max(1) - 1
    }

    /// Whether `(row, col)` lies inside this cell's footprint.
    pub fn covers(&self, row: u32, col: u32) -> bool {
        (self.row..=self.row_end()).contains(&row) && (self.col..=self.col_end()).contains(&col)
    }

    pub fn has_image(&self) -> bool {
        self.template == TemplateType::Image && self.image.url.is_some()
    }

    pub fn text_block(&self, field: TextField) -> &TextBlock {
        field.block(&self.text)
    }

    pub fn text_block_mut(&mut self, field: TextField) -> &mut TextBlock {
        field.block_mut(&mut self.text)
    }

    /// Switch the content kind. Alignment and font families go back to their
    /// defaults and any image is dropped; text content and sizes are kept.
    pub fn assign_template(&mut self, template: TemplateType) {
        self.template = template;
        self.text.vertical_align = VerticalAlign::Top;
        self.text.horizontal_align = HorizontalAlign::Left;
        for field in TextField::ALL {
            field.block_mut(&mut self.text).font_family = DEFAULT_FONT_FAMILY.to_string();
        }
        self.image = ImagePayload::default();
    }

    /// Restore content to defaults, keeping id, position, span and hidden.
    pub fn reset_content(&mut self) {
        self.template = TemplateType::None;
        self.text = TextPayload::default();
        self.image = ImagePayload::default();
    }

    /// Turn this cell into an image cell showing `url` at its natural offset.
    pub fn set_image(&mut self, url: impl Into<String>) {
        self.template = TemplateType::Image;
        self.image = ImagePayload {
            url: Some(url.into()),
            ..ImagePayload::default()
        };
    }
}
