use crate::{Bounds, FontError, Glyph, Stroke};

const HEADER_LEN: usize = 8;
const ORIGIN: u8 = b'R';

fn coord(byte: u8) -> i32 {
    i32::from(byte) - i32::from(ORIGIN)
}

/// Parses every glyph in `.jhf` data, in file order.
///
/// Each glyph starts with a 5-column key and a 3-column vertex count; the
/// count includes the leading left/right spacing pair. Glyphs longer than a
/// line continue on the following lines. `" R"` lifts the pen.
pub fn parse_glyphs(data: &str) -> Result<Vec<Glyph>, FontError> {
    let mut glyphs = Vec::new();
    let mut lines = data
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim_end_matches('\r')));

    while let Some((number, line)) = lines.next() {
        if line.trim().is_empty() {
            continue;
        }
        let err = |message: String| FontError::Parse {
            line: number,
            message,
        };
        if !line.is_ascii() {
            return Err(err("non-ASCII glyph data".into()));
        }
        if line.len() < HEADER_LEN + 2 {
            return Err(err(format!("glyph line too short: '{line}'")));
        }

        let key: u32 = line[..5]
            .trim()
            .parse()
            .map_err(|_| err(format!("invalid glyph key '{}'", &line[..5])))?;
        let count: usize = line[5..HEADER_LEN]
            .trim()
            .parse()
            .map_err(|_| err(format!("invalid vertex count '{}'", &line[5..HEADER_LEN])))?;
        if count == 0 {
            return Err(err(format!("glyph {key} has no spacing pair")));
        }

        let mut body = line[HEADER_LEN..].to_string();
        while body.len() < count * 2 {
            match lines.next() {
                Some((_, more)) if more.is_ascii() => body.push_str(more),
                Some((more_number, _)) => {
                    return Err(FontError::Parse {
                        line: more_number,
                        message: "non-ASCII glyph data".into(),
                    })
                }
                None => return Err(err(format!("glyph {key} is truncated"))),
            }
        }

        glyphs.push(parse_body(key, &body.as_bytes()[..count * 2]));
    }

    Ok(glyphs)
}

fn parse_body(key: u32, body: &[u8]) -> Glyph {
    let left = coord(body[0]);
    let right = coord(body[1]);

    let mut bounds = Bounds::default();
    let mut strokes: Vec<Stroke> = Vec::new();
    let mut current: Stroke = Vec::new();
    for pair in body[2..].chunks_exact(2) {
        if pair == b" R" {
            if !current.is_empty() {
                strokes.push(std::mem::take(&mut current));
            }
            continue;
        }
        let (x, y) = (coord(pair[0]), coord(pair[1]));
        bounds.left = bounds.left.min(x);
        bounds.right = bounds.right.max(x);
        bounds.top = bounds.top.min(y);
        bounds.bottom = bounds.bottom.max(y);
        current.push([x as f32, y as f32]);
    }
    if !current.is_empty() {
        strokes.push(current);
    }

    Glyph {
        key,
        left,
        right,
        bounds,
        strokes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::jhf_line;

    #[test]
    fn splits_strokes_on_pen_up() {
        let line = jhf_line(
            501,
            -3,
            4,
            &[Some((0, -6)), Some((0, 6)), None, Some((-2, 1)), Some((3, 1))],
        );
        let glyphs = parse_glyphs(&line).unwrap();
        assert_eq!(glyphs.len(), 1);

        let glyph = &glyphs[0];
        assert_eq!(glyph.key, 501);
        assert_eq!((glyph.left, glyph.right), (-3, 4));
        assert_eq!(glyph.width(), 7.0);
        assert_eq!(
            glyph.strokes,
            vec![vec![[0.0, -6.0], [0.0, 6.0]], vec![[-2.0, 1.0], [3.0, 1.0]]]
        );
        assert_eq!(
            glyph.bounds,
            Bounds {
                left: -2,
                right: 3,
                top: -6,
                bottom: 6
            }
        );
    }

    #[test]
    fn joins_continuation_lines() {
        let points: Vec<Option<(i32, i32)>> = (0..40).map(|i| Some((i % 10 - 5, i / 10))).collect();
        let line = jhf_line(7, -6, 6, &points);
        let (head, tail) = line.split_at(72);
        let data = format!("{head}\n{tail}\n{}\n", jhf_line(8, -1, 1, &[]));

        let glyphs = parse_glyphs(&data).unwrap();
        assert_eq!(glyphs.len(), 2);
        assert_eq!(glyphs[0].strokes[0].len(), 40);
        assert_eq!(glyphs[1].key, 8);
        assert!(glyphs[1].strokes.is_empty());
    }

    #[test]
    fn space_glyph_has_no_strokes() {
        let glyphs = parse_glyphs(&jhf_line(1, -8, 8, &[])).unwrap();
        assert!(glyphs[0].strokes.is_empty());
        assert_eq!(glyphs[0].width(), 16.0);
    }

    #[test]
    fn reports_line_numbers() {
        let data = format!("{}\n  abc 2QSRR\n", jhf_line(1, -1, 1, &[]));
        match parse_glyphs(&data) {
            Err(FontError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncated_glyph_is_an_error() {
        let line = jhf_line(3, -1, 1, &[Some((0, 0)), Some((1, 1))]);
        let cut = &line[..line.len() - 2];
        assert!(matches!(
            parse_glyphs(cut),
            Err(FontError::Parse { line: 1, .. })
        ));
    }
}
