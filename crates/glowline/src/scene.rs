use glowpipe::{Polyline, Sprite, SpriteMap, Viewport};
use hershey::Font;

const HERO: &str = "hero";
const HERO_SCALE: f32 = 100.0;
const TEXT: &str = "text";
const TEXT_MARGIN: f32 = 40.0;

const HERO_OUTLINE: [[f32; 2]; 14] = [
    [0.0, 0.5],
    [0.125, 0.4167],
    [0.25, 0.0],
    [0.375, -0.1667],
    [0.25, -0.5],
    [0.125, -0.5],
    [0.0625, -0.25],
    [-0.0625, -0.25],
    [-0.125, -0.5],
    [-0.25, -0.5],
    [-0.375, -0.1667],
    [-0.25, 0.0],
    [-0.125, 0.4167],
    [0.0, 0.5],
];

pub fn hero_shapes() -> Vec<Polyline> {
    vec![HERO_OUTLINE.to_vec()]
}

/// Lays `text` out for a `viewport`-sized canvas, flipped so it reads upright
/// in the y-up world.
pub fn text_shapes(font: &Font, text: &str, viewport: Viewport) -> Vec<Polyline> {
    let max_width = (viewport.width as f32 - 2.0 * TEXT_MARGIN).max(1.0);
    font.layout_text(text, max_width)
        .into_iter()
        .map(|stroke| stroke.into_iter().map(|[x, y]| [x, -y]).collect())
        .collect()
}

/// Demo scene: the hero outline centred on the `scene` layer and an optional
/// text block in the top-left corner of the `hud` layer.
pub struct Scene {
    sprites: Vec<SpriteMap>,
    hero_layer: usize,
    text_layer: usize,
    text: Option<Sprite>,
}

impl Scene {
    pub fn new<S: AsRef<str>>(layers: &[S], text: Option<Vec<Polyline>>, viewport: Viewport) -> Self {
        let find = |name: &str| layers.iter().position(|layer| layer.as_ref() == name);
        let last = layers.len().saturating_sub(1);
        let hero_layer = find("scene").unwrap_or(last);
        let text_layer = find("hud").unwrap_or(0);

        let text = text.map(|shapes| {
            Sprite::new(shapes).with_position(
                -(viewport.width as f32) * 0.5 + TEXT_MARGIN,
                viewport.height as f32 * 0.5 - TEXT_MARGIN,
            )
        });

        let mut scene = Self {
            sprites: vec![SpriteMap::new(); layers.len()],
            hero_layer,
            text_layer,
            text,
        };
        scene.update();
        scene
    }

    /// One simulation step: places every sprite for the next draw.
    pub fn update(&mut self) {
        if let Some(layer) = self.sprites.get_mut(self.hero_layer) {
            layer.insert(
                HERO.to_string(),
                Sprite::new(hero_shapes()).with_scale(HERO_SCALE),
            );
        }
        if let (Some(text), Some(layer)) = (&self.text, self.sprites.get_mut(self.text_layer)) {
            layer.insert(TEXT.to_string(), text.clone());
        }
    }

    pub fn sprites(&self) -> &[SpriteMap] {
        &self.sprites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport::new(800, 600)
    }

    #[test]
    fn hero_lands_on_the_scene_layer() {
        let scene = Scene::new(&["hud", "scene", "backdrop"], None, viewport());
        let sprites = scene.sprites();
        assert_eq!(sprites.len(), 3);
        assert!(sprites[0].is_empty());
        assert!(sprites[2].is_empty());

        let hero = &sprites[1][HERO];
        assert!(hero.visible);
        assert_eq!(hero.scale, HERO_SCALE);
        assert_eq!(hero.point_count(), 14);
    }

    #[test]
    fn falls_back_to_the_last_and_first_layers() {
        let text = vec![vec![[0.0, 0.0], [1.0, 0.0]]];
        let scene = Scene::new(&["back", "front"], Some(text), viewport());
        assert!(scene.sprites()[1].contains_key(HERO));
        let label = &scene.sprites()[0][TEXT];
        assert_eq!(label.position, [-360.0, 260.0]);
    }

    #[test]
    fn update_is_stable() {
        let mut scene = Scene::new(&["scene"], None, viewport());
        let before = scene.sprites().to_vec();
        scene.update();
        assert_eq!(scene.sprites(), &before[..]);
    }

    #[test]
    fn text_is_flipped_upright() {
        let data = "    1  1JZ\n    2  3MWRMRW\n";
        let font = Font::parse("custom", data).unwrap();
        let shapes = text_shapes(&font, "!", viewport());
        assert_eq!(shapes, vec![vec![[5.0, 5.0], [5.0, -5.0]]]);
    }
}
