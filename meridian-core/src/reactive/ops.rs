//! Boolean and equality helpers.
//!
//! Each helper is a plain `map`, `zip2` or `flat_map`, so it inherits their
//! guarantees: one recomputation per pass, and only distinct values are
//! forwarded.

use std::ops::{BitAnd, BitOr, Not};

use super::cell::Incr;

impl Incr<bool> {
    /// `self && other`.
    pub fn and(&self, other: &Incr<bool>) -> Incr<bool> {
        self.zip2(other, |a, b| *a && *b)
    }

    /// `self || other`.
    pub fn or(&self, other: &Incr<bool>) -> Incr<bool> {
        self.zip2(other, |a, b| *a || *b)
    }

    /// Logical negation. Also available as `!&cell`.
    pub fn not(&self) -> Incr<bool> {
        self.map(|v| !*v)
    }

    /// Hold `then` while this cell is true, `otherwise` while it is false.
    pub fn if_<T>(&self, then: T, otherwise: T) -> Incr<T>
    where
        T: Clone + PartialEq + 'static,
    {
        self.map(move |condition| {
            if *condition {
                then.clone()
            } else {
                otherwise.clone()
            }
        })
    }

    /// Follow `then` while this cell is true, `otherwise` while it is false.
    ///
    /// Only the active branch is subscribed, so changes to the other branch
    /// cause no work.
    pub fn select<T>(&self, then: &Incr<T>, otherwise: &Incr<T>) -> Incr<T>
    where
        T: Clone + PartialEq + 'static,
    {
        let (then, otherwise) = (then.clone(), otherwise.clone());
        self.flat_map(move |condition| {
            if *condition {
                then.clone()
            } else {
                otherwise.clone()
            }
        })
    }
}

impl Not for &Incr<bool> {
    type Output = Incr<bool>;

    fn not(self) -> Incr<bool> {
        Incr::not(self)
    }
}

impl BitAnd for &Incr<bool> {
    type Output = Incr<bool>;

    fn bitand(self, rhs: Self) -> Incr<bool> {
        self.and(rhs)
    }
}

impl BitOr for &Incr<bool> {
    type Output = Incr<bool>;

    fn bitor(self, rhs: Self) -> Incr<bool> {
        self.or(rhs)
    }
}

impl<T: Clone + PartialEq + 'static> Incr<T> {
    /// `self == other`.
    pub fn equals(&self, other: &Incr<T>) -> Incr<bool> {
        self.zip2(other, |a, b| a == b)
    }

    /// `self == value`.
    pub fn equals_value(&self, value: T) -> Incr<bool> {
        self.map(move |v| *v == value)
    }
}

impl<T: Clone + PartialEq + 'static> Incr<Option<T>> {
    /// The wrapped value, or `fallback`'s value while this cell is `None`.
    pub fn coalesce(&self, fallback: &Incr<T>) -> Incr<T> {
        self.zip2(fallback, |value, fallback| {
            value.clone().unwrap_or_else(|| fallback.clone())
        })
    }

    /// The wrapped value, or `default` while this cell is `None`.
    pub fn unwrap_or(&self, default: T) -> Incr<T> {
        self.map(move |value| value.clone().unwrap_or_else(|| default.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::reactive::{InputCell, Runtime};

    #[test]
    fn boolean_operators() {
        let a = InputCell::new(true);
        let b = InputCell::new(false);
        let both = &*a & &*b;
        let either = &*a | &*b;
        let neither = !&either;

        assert!(!both.value());
        assert!(either.value());
        assert!(!neither.value());

        Runtime::batch(|| {
            a.write(false);
            b.write(false);
        });
        assert!(!either.value());
        assert!(neither.value());

        b.write(true);
        a.write(true);
        assert!(both.value());
    }

    #[test]
    fn and_fires_once_when_both_sides_change() {
        let zoom = InputCell::new(1);
        let above = zoom.map(|z| *z > 2);
        let below = zoom.map(|z| *z < 8);
        let visible = above.and(&below);

        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let _watch = visible.observe(move |_| counter.set(counter.get() + 1));

        // Both sides flip but the conjunction stays false.
        zoom.write(9);
        assert_eq!(calls.get(), 1);

        zoom.write(5);
        assert_eq!(calls.get(), 2);
        assert!(visible.value());
    }

    #[test]
    fn equality_helpers() {
        let layer = InputCell::new("roads");
        let selected = InputCell::new("rivers");
        let is_selected = layer.equals(&selected);
        let is_roads = layer.equals_value("roads");

        assert!(!is_selected.value());
        assert!(is_roads.value());

        selected.write("roads");
        assert!(is_selected.value());
        layer.write("parks");
        assert!(!is_roads.value());
    }

    #[test]
    fn coalesce_falls_back_while_none() {
        let override_name = InputCell::new(None::<String>);
        let default_name = InputCell::new("Untitled".to_string());
        let title = override_name.coalesce(&default_name);
        let fixed = override_name.unwrap_or("Map".to_string());

        assert_eq!(title.value(), "Untitled");
        assert_eq!(fixed.value(), "Map");

        default_name.write("Draft".to_string());
        assert_eq!(title.value(), "Draft");

        override_name.write(Some("Coastline".to_string()));
        assert_eq!(title.value(), "Coastline");
        assert_eq!(fixed.value(), "Coastline");
    }

    #[test]
    fn if_chooses_between_values() {
        let night = InputCell::new(false);
        let palette = night.if_("dark", "light");
        assert_eq!(palette.value(), "light");

        night.write(true);
        assert_eq!(palette.value(), "dark");
    }

    #[test]
    fn select_subscribes_only_active_branch() {
        let satellite = InputCell::new(false);
        let street_tiles = InputCell::new(1);
        let satellite_tiles = InputCell::new(100);
        let tiles = satellite.select(&satellite_tiles, &street_tiles);
        assert_eq!(tiles.value(), 1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let _watch = tiles.observe(move |v| log.borrow_mut().push(*v));

        satellite_tiles.write(101);
        assert_eq!(*seen.borrow(), vec![1]);

        satellite.write(true);
        street_tiles.write(2);
        satellite_tiles.write(102);
        assert_eq!(*seen.borrow(), vec![1, 101, 102]);
    }
}
