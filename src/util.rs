pub use bon::{bon, builder, Builder};
pub use colored::Colorize;
pub use derive_new::new;
pub use indicatif::{ProgressBar, ProgressStyle};
pub use itertools::Itertools;
pub use log::{debug, info, warn};
pub use logging_timer::{finish, time, timer};
pub use once_cell::sync::Lazy;
pub use ordered_float::OrderedFloat;
pub use prettytable::{row, Table};
pub use smallvec::SmallVec;
pub use std::fmt;

pub type Shared<T> = std::rc::Rc<T>;
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, foldhash::fast::RandomState>;
pub type Set<T> = foldhash::HashSet<T>;
pub type Dict<K, V> = foldhash::HashMap<K, V>;

#[allow(non_camel_case_types)]
pub type float = f64;
#[allow(non_camel_case_types)]
pub type int = i64;
#[allow(non_camel_case_types)]
pub type uint = u64;

pub type Vector2 = (float, float);

/// Manhattan distance between two points.
pub fn norm1(p1: Vector2, p2: Vector2) -> float {
    (p1.0 - p2.0).abs() + (p1.1 - p2.1).abs()
}

/// Euclidean distance between two points.
pub fn norm2(p1: Vector2, p2: Vector2) -> float {
    ((p1.0 - p2.0).powi(2) + (p1.1 - p2.1).powi(2)).sqrt()
}

pub trait CCfloat {
    fn float(self) -> float;
}

macro_rules! impl_ccfloat {
    ($($t:ty),*) => {
        $(impl CCfloat for $t {
            fn float(self) -> float {
                self as float
            }
        })*
    };
}
impl_ccfloat!(usize, u32, u64, i32, i64, f32, f64);

pub trait CCusize {
    fn usize(self) -> usize;
}

macro_rules! impl_ccusize {
    ($($t:ty),*) => {
        $(impl CCusize for $t {
            fn usize(self) -> usize {
                self as usize
            }
        })*
    };
}
impl_ccusize!(u32, u64, i32, i64);

pub trait CCint {
    fn int(self) -> int;
}

macro_rules! impl_ccint {
    ($($t:ty),*) => {
        $(impl CCint for $t {
            fn int(self) -> int {
                self as int
            }
        })*
    };
}
impl_ccint!(usize, u32, u64, i32, f64);
