//! Tool catalog and the participant's current tool.
//!
//! Every point recorded in a stroke log carries a [`ToolSnapshot`], a deep copy
//! of the tool at the moment the point was drawn. Adjusting the current tool
//! afterwards only affects future snapshots.

use crate::error::{BoardError, BoardResult};
use crate::style::{CompositeMode, LineCap, LineJoin, SerializableColor};
use serde::{Deserialize, Serialize};

/// Available drawing tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Pen,
    Eraser,
    Highlighter,
}

impl ToolKind {
    /// All tool kinds in catalog order.
    pub const ALL: [ToolKind; 3] = [ToolKind::Pen, ToolKind::Eraser, ToolKind::Highlighter];

    /// Canonical catalog name.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Pen => "pen",
            ToolKind::Eraser => "eraser",
            ToolKind::Highlighter => "highlighter",
        }
    }

    /// Look up a kind by name. The short verbs `draw`, `erase` and `highlight`
    /// are accepted as aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pen" | "draw" => Some(ToolKind::Pen),
            "eraser" | "erase" => Some(ToolKind::Eraser),
            "highlighter" | "highlight" => Some(ToolKind::Highlighter),
            _ => None,
        }
    }

    /// Whether the user may change the stroke width.
    pub fn size_adjustable(self) -> bool {
        match self {
            ToolKind::Pen | ToolKind::Eraser | ToolKind::Highlighter => true,
        }
    }

    /// Whether the user may change the stroke color.
    pub fn color_adjustable(self) -> bool {
        match self {
            ToolKind::Pen | ToolKind::Highlighter => true,
            ToolKind::Eraser => false,
        }
    }

    /// Factory attributes for this kind.
    pub fn defaults(self) -> ToolSnapshot {
        match self {
            ToolKind::Pen => ToolSnapshot {
                kind: self,
                width: 1.0,
                color: SerializableColor::black(),
                opacity: 1.0,
                composite: CompositeMode::SourceOver,
                join: LineJoin::Round,
                cap: LineCap::Round,
            },
            ToolKind::Eraser => ToolSnapshot {
                kind: self,
                width: 5.0,
                color: SerializableColor::new(236, 236, 236, 255),
                opacity: 1.0,
                composite: CompositeMode::DestinationOut,
                join: LineJoin::Round,
                cap: LineCap::Round,
            },
            ToolKind::Highlighter => ToolSnapshot {
                kind: self,
                width: 50.0,
                color: SerializableColor::yellow(),
                opacity: 1.0,
                composite: CompositeMode::Multiply,
                join: LineJoin::Round,
                cap: LineCap::Round,
            },
        }
    }
}

/// Immutable rendering attributes of a tool, copied into every point event.
///
/// Equality compares the whole attribute bundle; the renderer uses it to decide
/// whether the surface needs its attributes re-applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSnapshot {
    pub kind: ToolKind,
    /// Stroke width in surface units.
    pub width: f64,
    pub color: SerializableColor,
    /// Opacity from 0.0 to 1.0, applied on top of the color alpha.
    pub opacity: f64,
    pub composite: CompositeMode,
    pub join: LineJoin,
    pub cap: LineCap,
}

impl Default for ToolSnapshot {
    fn default() -> Self {
        ToolKind::default().defaults()
    }
}

/// Immutable catalog of the drawing tools, looked up by name.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: [ToolSnapshot; 3],
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create the standard catalog (pen, eraser, highlighter).
    pub fn new() -> Self {
        Self {
            tools: ToolKind::ALL.map(ToolKind::defaults),
        }
    }

    /// Get a tool by name or alias.
    pub fn get(&self, name: &str) -> Option<&ToolSnapshot> {
        ToolKind::from_name(name).map(|kind| self.by_kind(kind))
    }

    /// Get the catalog entry for a kind.
    pub fn by_kind(&self, kind: ToolKind) -> &ToolSnapshot {
        let index = match kind {
            ToolKind::Pen => 0,
            ToolKind::Eraser => 1,
            ToolKind::Highlighter => 2,
        };
        &self.tools[index]
    }

    /// Iterate over all catalog entries.
    pub fn iter(&self) -> impl Iterator<Item = &ToolSnapshot> {
        self.tools.iter()
    }
}

/// The tool a participant is currently drawing with, including user adjustments.
#[derive(Debug, Clone, Default)]
pub struct ToolSelection {
    current: ToolSnapshot,
}

impl ToolSelection {
    /// Create a selection holding the default pen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to a catalog tool, discarding previous adjustments.
    pub fn select(&mut self, registry: &ToolRegistry, kind: ToolKind) {
        self.current = registry.by_kind(kind).clone();
    }

    /// Switch to a catalog tool by name.
    pub fn select_by_name(&mut self, registry: &ToolRegistry, name: &str) -> BoardResult<()> {
        let kind = ToolKind::from_name(name)
            .ok_or_else(|| BoardError::InvalidInput(format!("unknown tool: {name}")))?;
        self.select(registry, kind);
        Ok(())
    }

    /// Kind of the current tool.
    pub fn kind(&self) -> ToolKind {
        self.current.kind
    }

    /// Change the stroke width if the current tool allows it.
    pub fn set_width(&mut self, width: f64) -> BoardResult<()> {
        if !self.current.kind.size_adjustable() {
            return Err(BoardError::InvalidInput(format!(
                "{} does not allow size changes",
                self.current.kind.name()
            )));
        }
        if !width.is_finite() || width <= 0.0 {
            return Err(BoardError::InvalidInput(format!("invalid stroke width: {width}")));
        }
        self.current.width = width;
        Ok(())
    }

    /// Change the stroke color if the current tool allows it.
    pub fn set_color(&mut self, color: SerializableColor) -> BoardResult<()> {
        if !self.current.kind.color_adjustable() {
            return Err(BoardError::InvalidInput(format!(
                "{} does not allow color changes",
                self.current.kind.name()
            )));
        }
        self.current.color = color;
        Ok(())
    }

    /// Deep copy of the current attributes, to be stored with a point.
    pub fn snapshot(&self) -> ToolSnapshot {
        self.current.clone()
    }
}
