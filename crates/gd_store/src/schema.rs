//! Persistence eligibility.
//!
//! A type takes part in saving by implementing [`Persist`]. Data holders use
//! [`persistable!`](crate::persistable), which builds a [`Shape::Record`] from
//! the listed fields. [`check`] walks the full shape of a root type before any
//! I/O happens and reports the first reachable type that is not marked.

use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::codec::SpecialKind;
use crate::shared::Shared;

/// Structural descriptor of a persistable type.
///
/// Nested shapes are held as function pointers so recursive types can be
/// described without building an infinite value.
#[derive(Debug, Clone)]
pub enum Shape {
    Scalar(&'static str),
    Special(SpecialKind),
    Sequence(fn() -> Shape),
    Mapping(fn() -> Shape, fn() -> Shape),
    Optional(fn() -> Shape),
    Shared(fn() -> Shape),
    Record { name: &'static str, fields: Vec<FieldShape> },
    /// A type that was never marked for persistence.
    Unmarked(&'static str),
}

#[derive(Debug, Clone)]
pub struct FieldShape {
    pub name: &'static str,
    pub shape: fn() -> Shape,
}

/// Marks a type as persistable and describes its shape.
///
/// The default shape is [`Shape::Unmarked`]: an empty `impl Persist for T {}`
/// lets `T` be passed to the store but fails the eligibility check.
pub trait Persist {
    fn shape() -> Shape {
        Shape::Unmarked(type_name::<Self>())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{type_name}` is not persistable: `{offending}` at `{path}` is not marked")]
pub struct EligibilityError {
    /// Root type that was checked.
    pub type_name: &'static str,
    /// Field path from the root to the offending type.
    pub path: String,
    pub offending: &'static str,
}

/// Outcome of an eligibility check.
pub type Verdict = Result<(), EligibilityError>;

static VERDICTS: Lazy<Mutex<HashMap<TypeId, Verdict>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Deep eligibility check of `T` and every type reachable from it.
///
/// The verdict is computed once per type and cached for the process lifetime.
pub fn check<T: Persist + 'static>() -> Verdict {
    let id = TypeId::of::<T>();
    let mut verdicts = VERDICTS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(verdict) = verdicts.get(&id) {
        return verdict.clone();
    }

    let root = type_name::<T>();
    let mut walker = Walker { root, path: Vec::new(), visited: HashSet::new() };
    let verdict = walker.walk(T::shape());
    match &verdict {
        Ok(()) => log::debug!("Eligibility check passed for {}", root),
        Err(err) => log::debug!("Eligibility check failed: {}", err),
    }
    verdicts.insert(id, verdict.clone());
    verdict
}

pub fn is_eligible<T: Persist + 'static>() -> bool {
    check::<T>().is_ok()
}

struct Walker {
    root: &'static str,
    path: Vec<String>,
    visited: HashSet<&'static str>,
}

impl Walker {
    fn walk(&mut self, shape: Shape) -> Verdict {
        match shape {
            Shape::Scalar(_) | Shape::Special(_) => Ok(()),
            Shape::Optional(inner) | Shape::Shared(inner) => self.walk(inner()),
            Shape::Sequence(element) => self.nested("[]", element),
            Shape::Mapping(key, value) => {
                self.nested("{key}", key)?;
                self.nested("{value}", value)
            }
            Shape::Record { name, fields } => {
                // Recursive types terminate at the first repeat.
                if !self.visited.insert(name) {
                    return Ok(());
                }
                for field in fields {
                    let segment = if self.path.is_empty() {
                        field.name.to_string()
                    } else {
                        format!(".{}", field.name)
                    };
                    self.nested(&segment, field.shape)?;
                }
                Ok(())
            }
            Shape::Unmarked(offending) => Err(EligibilityError {
                type_name: self.root,
                path: if self.path.is_empty() { "<root>".to_string() } else { self.path.concat() },
                offending,
            }),
        }
    }

    fn nested(&mut self, segment: &str, shape: fn() -> Shape) -> Verdict {
        self.path.push(segment.to_string());
        let verdict = self.walk(shape());
        self.path.pop();
        verdict
    }
}

/// Implements [`Persist`] for a data holder from its named fields.
///
/// Every field of the struct must be listed. Each listed type must implement
/// `Persist` and match the declared field type, or the invocation fails to
/// compile.
///
/// ```
/// use gd_store::persistable;
///
/// #[derive(Default, serde::Serialize, serde::Deserialize)]
/// struct Wallet {
///     coins: i32,
///     history: Vec<i32>,
/// }
///
/// persistable!(Wallet { coins: i32, history: Vec<i32> });
///
/// assert!(gd_store::schema::is_eligible::<Wallet>());
/// ```
///
/// Leaving a field out is a compile error:
///
/// ```compile_fail
/// use gd_store::persistable;
///
/// struct Handle(u64);
///
/// struct Holder {
///     coins: i32,
///     handle: Handle,
/// }
///
/// persistable!(Holder { coins: i32 });
/// ```
#[macro_export]
macro_rules! persistable {
    ($ty:path { $($field:ident : $fty:ty),* $(,)? }) => {
        impl $crate::schema::Persist for $ty {
            fn shape() -> $crate::schema::Shape {
                #[allow(dead_code)]
                fn field_types(value: &$ty) {
                    let $ty { $($field: _),* } = value;
                    $(let _: &$fty = &value.$field;)*
                }

                $crate::schema::Shape::Record {
                    name: ::std::any::type_name::<$ty>(),
                    fields: ::std::vec![$(
                        $crate::schema::FieldShape {
                            name: ::std::stringify!($field),
                            shape: <$fty as $crate::schema::Persist>::shape,
                        }
                    ),*],
                }
            }
        }
    };
}

macro_rules! impl_scalar {
    ($($ty:ty),*) => {
        $(
            impl Persist for $ty {
                fn shape() -> Shape {
                    Shape::Scalar(stringify!($ty))
                }
            }
        )*
    };
}

impl_scalar!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, char, String, ());

impl<T: Persist> Persist for Vec<T> {
    fn shape() -> Shape {
        Shape::Sequence(T::shape)
    }
}

impl<T: Persist> Persist for VecDeque<T> {
    fn shape() -> Shape {
        Shape::Sequence(T::shape)
    }
}

impl<T: Persist, const N: usize> Persist for [T; N] {
    fn shape() -> Shape {
        Shape::Sequence(T::shape)
    }
}

impl<T: Persist> Persist for Option<T> {
    fn shape() -> Shape {
        Shape::Optional(T::shape)
    }
}

impl<T: Persist> Persist for Box<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: Persist> Persist for Shared<T> {
    fn shape() -> Shape {
        Shape::Shared(T::shape)
    }
}

impl<K: Persist, V: Persist, S> Persist for HashMap<K, V, S> {
    fn shape() -> Shape {
        Shape::Mapping(K::shape, V::shape)
    }
}

impl<K: Persist, V: Persist> Persist for BTreeMap<K, V> {
    fn shape() -> Shape {
        Shape::Mapping(K::shape, V::shape)
    }
}

impl<T: Persist, S> Persist for HashSet<T, S> {
    fn shape() -> Shape {
        Shape::Sequence(T::shape)
    }
}

impl<T: Persist> Persist for BTreeSet<T> {
    fn shape() -> Shape {
        Shape::Sequence(T::shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Quaternion, Vector3};

    struct Opaque;
    impl Persist for Opaque {}

    #[allow(dead_code)]
    struct Transform {
        position: Vector3,
        rotation: Quaternion,
        tags: Vec<String>,
    }
    crate::persistable!(Transform { position: Vector3, rotation: Quaternion, tags: Vec<String> });

    #[allow(dead_code)]
    struct Level {
        name: String,
        spawns: HashMap<String, Vec<Transform>>,
    }
    crate::persistable!(Level { name: String, spawns: HashMap<String, Vec<Transform>> });

    #[allow(dead_code)]
    struct Broken {
        level: Level,
        handle: Option<Vec<Opaque>>,
    }
    crate::persistable!(Broken { level: Level, handle: Option<Vec<Opaque>> });

    #[allow(dead_code)]
    #[derive(Default)]
    struct Node {
        value: i32,
        children: Vec<Shared<Node>>,
        parent: Option<Shared<Node>>,
    }
    crate::persistable!(Node { value: i32, children: Vec<Shared<Node>>, parent: Option<Shared<Node>> });

    #[test]
    fn test_nested_records_are_eligible() {
        assert_eq!(check::<Level>(), Ok(()));
        assert!(is_eligible::<Vec<Transform>>());
        assert!(is_eligible::<[Vector3; 4]>());
    }

    #[test]
    fn test_unmarked_type_is_rejected() {
        let err = check::<Opaque>().unwrap_err();
        assert_eq!(err.path, "<root>");
        assert!(err.offending.ends_with("Opaque"));
    }

    #[test]
    fn test_deep_check_reports_field_path() {
        let err = check::<Broken>().unwrap_err();
        assert!(err.type_name.ends_with("Broken"));
        assert_eq!(err.path, "handle[]");
        assert!(err.offending.ends_with("Opaque"));
    }

    #[test]
    fn test_recursive_type_terminates() {
        assert_eq!(check::<Node>(), Ok(()));
    }

    #[test]
    fn test_verdict_is_cached() {
        let first = check::<Broken>();
        let second = check::<Broken>();
        assert_eq!(first, second);
        let verdicts = VERDICTS.lock().unwrap();
        assert!(verdicts.contains_key(&TypeId::of::<Broken>()));
    }

    #[test]
    fn test_record_shape_lists_fields_in_order() {
        match Transform::shape() {
            Shape::Record { fields, .. } => {
                let names: Vec<_> = fields.iter().map(|field| field.name).collect();
                assert_eq!(names, vec!["position", "rotation", "tags"]);
            }
            other => panic!("expected a record shape, got {:?}", other),
        }
    }
}
