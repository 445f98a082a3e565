//! Hershey vector fonts (`.jhf`) and text layout into polylines.
//!
//! Glyph coordinates are the raw Hershey grid: `x` grows to the right, `y`
//! grows downwards, and the origin sits on the glyph's centre line. Layout
//! output is in the same units, one text line per [`Font::line_height`].

mod layout;
mod parse;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub use parse::parse_glyphs;

/// A laid-out stroke, compatible with a sprite shape.
pub type Stroke = Vec<[f32; 2]>;

/// Character sets of the bundled fonts, in ascending glyph key order.
pub const FONT_CHARS: &[(&str, &str)] = &[
    (
        "futural",
        "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz 0123456789!?\"$/()|-+=*'#&\\^.,:;`[]{}<>~%@°",
    ),
    (
        "futuram",
        " |-#\\()[]{}<>~^`%&@ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.,:;!?$/*+='\"°",
    ),
    (
        "rowmant",
        "\\_[]{}|<>~^%@#ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz 0123456789.,:;!?`'&$/()*-+=\"°",
    ),
    (
        "scripts",
        "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz .°|-+=#\\_[]{}<>~^%@0123456789,:;!?`'&$/()*\"",
    ),
    (
        "scriptc",
        "\\_[]{}|<>~^%@#ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz 0123456789.,:;!?`'&$/()*-+=\"°",
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("font '{0}' contains no glyphs")]
    Empty(String),
}

/// Extent of a glyph's points, always including the origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn height(&self) -> i32 {
        self.top.abs() + self.bottom.abs()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub key: u32,
    /// Left and right spacing columns from the glyph header.
    pub left: i32,
    pub right: i32,
    pub bounds: Bounds,
    /// Pen-down runs; a pen-up starts the next stroke.
    pub strokes: Vec<Stroke>,
}

impl Glyph {
    /// Horizontal advance.
    pub fn width(&self) -> f32 {
        (self.right - self.left) as f32
    }
}

#[derive(Debug, Clone)]
pub struct Font {
    name: String,
    glyphs: BTreeMap<u32, Glyph>,
    line_height: f32,
    char_keys: HashMap<char, u32>,
}

impl Font {
    /// Parses `.jhf` data. `name` selects the character mapping; fonts not
    /// listed in [`FONT_CHARS`] map printable ASCII from the space onwards.
    pub fn parse(name: &str, data: &str) -> Result<Self, FontError> {
        let glyphs: BTreeMap<u32, Glyph> = parse_glyphs(data)?
            .into_iter()
            .map(|glyph| (glyph.key, glyph))
            .collect();
        if glyphs.is_empty() {
            return Err(FontError::Empty(name.to_string()));
        }

        let line_height = glyphs
            .values()
            .map(|glyph| glyph.bounds.height())
            .max()
            .unwrap_or(0) as f32;

        let chars: Vec<char> = match FONT_CHARS.iter().find(|(font, _)| *font == name) {
            Some((_, chars)) => chars.chars().collect(),
            None => (' '..='~').collect(),
        };
        let char_keys = chars.into_iter().zip(glyphs.keys().copied()).collect();

        tracing::debug!(font = name, glyphs = glyphs.len(), line_height, "parsed font");
        Ok(Self {
            name: name.to_string(),
            glyphs,
            line_height,
            char_keys,
        })
    }

    /// Reads a `.jhf` file; the file stem is the font name.
    pub fn load(path: &Path) -> Result<Self, FontError> {
        let data = std::fs::read_to_string(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        Self::parse(name, &data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn glyph(&self, key: u32) -> Option<&Glyph> {
        self.glyphs.get(&key)
    }

    pub fn glyph_for(&self, ch: char) -> Option<&Glyph> {
        self.char_keys.get(&ch).and_then(|key| self.glyphs.get(key))
    }

    /// Glyphs for every mapped character of `text`; unmapped ones are skipped.
    pub fn glyphs_for<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a Glyph> + 'a {
        text.chars().filter_map(|ch| self.glyph_for(ch))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::io::Write;

    #[test]
    fn known_font_maps_characters_in_key_order() {
        let font = Font::parse("futuram", &box_font(3)).unwrap();
        // futuram starts with " |-#"
        assert_eq!(font.glyph_for(' ').map(|g| g.key), Some(1));
        assert_eq!(font.glyph_for('|').map(|g| g.key), Some(2));
        assert_eq!(font.glyph_for('#').map(|g| g.key), Some(4));
        assert!(font.glyph_for('A').is_none());
    }

    #[test]
    fn unknown_font_maps_ascii() {
        let font = Font::parse("custom", &box_font(2)).unwrap();
        assert_eq!(font.glyph_for(' ').map(|g| g.key), Some(1));
        assert_eq!(font.glyph_for('!').map(|g| g.key), Some(2));
        assert_eq!(font.glyph_for('"').map(|g| g.key), Some(3));
        assert!(font.glyph_for('#').is_none());
    }

    #[test]
    fn line_height_spans_tallest_glyph() {
        let font = Font::parse("custom", &box_font(1)).unwrap();
        assert_eq!(font.line_height(), 8.0);
        assert_eq!(font.glyph(2).unwrap().width(), 10.0);
    }

    #[test]
    fn empty_data_is_an_error() {
        assert!(matches!(Font::parse("x", "\n\n"), Err(FontError::Empty(_))));
    }

    #[test]
    fn load_uses_file_stem_as_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("futural.jhf");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(box_font(2).as_bytes()).unwrap();

        let font = Font::load(&path).unwrap();
        assert_eq!(font.name(), "futural");
        assert_eq!(font.glyph_for('A').map(|g| g.key), Some(1));
        assert_eq!(font.glyphs_for("AB?").count(), 2);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Font::load(Path::new("/nonexistent/futural.jhf")).unwrap_err();
        assert!(matches!(err, FontError::Io { .. }));
    }
}
