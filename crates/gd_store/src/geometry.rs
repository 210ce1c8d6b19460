//! Engine value types with a dedicated on-disk encoding.

use serde::{Deserialize, Serialize};

use crate::codec::{SpecialKind, SpecialValue};
use crate::schema::{Persist, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// RGBA color, components nominally in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Rotation quaternion. Stored as given; not normalized.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

macro_rules! special_value {
    ($ty:ident, $kind:ident, [$($field:ident),+]) => {
        impl $ty {
            pub const fn new($($field: f32),+) -> Self {
                Self { $($field),+ }
            }
        }

        impl SpecialValue for $ty {
            const KIND: SpecialKind = SpecialKind::$kind;

            fn components(&self) -> Vec<f32> {
                vec![$(self.$field),+]
            }

            fn from_components(values: &[f32]) -> Option<Self> {
                match values {
                    [$($field),+] => Some(Self { $($field: *$field),+ }),
                    _ => None,
                }
            }
        }

        impl Persist for $ty {
            fn shape() -> Shape {
                Shape::Special(SpecialKind::$kind)
            }
        }
    };
}

special_value!(Vector2, Vector2, [x, y]);
special_value!(Vector3, Vector3, [x, y, z]);
special_value!(Vector4, Vector4, [x, y, z, w]);
special_value!(Color, Color, [r, g, b, a]);
special_value!(Quaternion, Quaternion, [x, y, z, w]);

impl Vector2 {
    pub const ZERO: Vector2 = Vector2::new(0.0, 0.0);
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);
    pub const UP: Vector3 = Vector3::new(0.0, 1.0, 0.0);
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const CLEAR: Color = Color::new(0.0, 0.0, 0.0, 0.0);
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion::new(0.0, 0.0, 0.0, 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_follow_declaration_order() {
        assert_eq!(Vector3::new(1.0, 2.0, 3.0).components(), vec![1.0, 2.0, 3.0]);
        assert_eq!(Color::new(0.1, 0.2, 0.3, 0.4).components(), vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(Quaternion::IDENTITY.components(), vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_from_components_requires_exact_arity() {
        assert_eq!(Vector2::from_components(&[4.0, 5.0]), Some(Vector2::new(4.0, 5.0)));
        assert_eq!(Vector2::from_components(&[4.0]), None);
        assert_eq!(Vector4::from_components(&[1.0, 2.0, 3.0, 4.0, 5.0]), None);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Vector2::KIND, SpecialKind::Vector2);
        assert_eq!(Color::KIND, SpecialKind::Color);
        assert_eq!(Quaternion::KIND, SpecialKind::Quaternion);
    }
}
