use crate::{Font, Glyph, Stroke};

impl Font {
    /// Lays `text` out into strokes, wrapping words at `max_width`.
    ///
    /// Lines inside a paragraph are joined; a blank line starts a new
    /// paragraph, separated from the previous one by an empty line. A word
    /// moves to the next line when it would reach `max_width` on a line that
    /// already holds something, so a single over-long word still gets a line
    /// of its own.
    ///
    /// This is not the classic Hershey demo wrap, which adds the word's width
    /// before testing, restarts the new line's width at zero (so the wrapped
    /// word is not counted) and emits an empty line ahead of an over-long
    /// first word. Here the wrapped word counts toward its new line and no
    /// empty line is emitted.
    pub fn layout_text(&self, text: &str, max_width: f32) -> Vec<Stroke> {
        let lines = self.wrap(text, max_width);

        let mut strokes = Vec::new();
        let mut y = 0.0;
        for line in &lines {
            let mut x = 0.0;
            for glyph in line {
                x -= glyph.left as f32;
                strokes.extend(glyph.strokes.iter().map(|stroke| {
                    stroke
                        .iter()
                        .map(|&[px, py]| [px + x, py + y])
                        .collect::<Stroke>()
                }));
                x += glyph.right as f32;
            }
            y += self.line_height();
        }
        strokes
    }

    fn wrap<'a>(&'a self, text: &str, max_width: f32) -> Vec<Vec<&'a Glyph>> {
        let space = self.glyph_for(' ');
        let mut lines = Vec::new();

        for (index, paragraph) in paragraphs(text).iter().enumerate() {
            if index > 0 {
                lines.push(Vec::new());
            }

            let mut line: Vec<&Glyph> = Vec::new();
            let mut width = 0.0;
            for word in paragraph.split_whitespace() {
                let glyphs: Vec<&Glyph> =
                    word.chars().filter_map(|ch| self.glyph_for(ch)).collect();
                let word_width: f32 = glyphs.iter().map(|glyph| glyph.width()).sum();
                if !line.is_empty() && width + word_width >= max_width {
                    lines.push(std::mem::take(&mut line));
                    width = 0.0;
                }
                line.extend(glyphs);
                width += word_width;
                if let Some(space) = space {
                    line.push(space);
                    width += space.width();
                }
            }
            lines.push(line);
        }
        lines
    }
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = vec![String::new()];
    for line in text.trim().lines().map(str::trim) {
        if line.is_empty() {
            paragraphs.push(String::new());
        } else if let Some(last) = paragraphs.last_mut() {
            last.push_str(line);
            last.push(' ');
        }
    }
    paragraphs
}
