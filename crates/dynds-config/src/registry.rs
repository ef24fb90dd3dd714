//! Process-wide cache of per-type setter tables

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use indexmap::IndexMap;

use crate::normalize::normalize_key;
use crate::setter::PropertySetter;

/// A type whose properties can be set from flat configuration
///
/// Implementors declare every string- or primitive-typed property once, as a
/// static table. The table is turned into a [`SetterIndex`] on first use.
pub trait Bindable: Sized + 'static {
    /// Name used in binding logs
    fn bind_target() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// The setter table for this type
    fn property_setters() -> Vec<PropertySetter<Self>>;
}

/// Setters of one type, indexed by normalized property name
pub struct SetterIndex<T> {
    target: &'static str,
    setters: IndexMap<String, PropertySetter<T>>,
}

impl<T: Bindable> SetterIndex<T> {
    fn build() -> Self {
        let target = T::bind_target();
        let mut setters = IndexMap::new();
        for setter in T::property_setters() {
            let key = normalize_key(setter.name());
            if setters.contains_key(&key) {
                tracing::warn!(
                    target_type = target,
                    property = setter.name(),
                    "duplicate property setter ignored"
                );
                continue;
            }
            setters.insert(key, setter);
        }
        tracing::debug!(target_type = target, setters = setters.len(), "setter index built");
        Self { target, setters }
    }
}

impl<T: 'static> SetterIndex<T> {
    /// Look up a setter by an already normalized key
    pub fn get(&self, normalized_key: &str) -> Option<&PropertySetter<T>> {
        self.setters.get(normalized_key)
    }

    /// Name of the target type
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Declared property names, in table order
    pub fn property_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.setters.values().map(|setter| setter.name())
    }

    /// All setters, in table order
    pub fn setters(&self) -> impl Iterator<Item = &PropertySetter<T>> {
        self.setters.values()
    }

    pub fn len(&self) -> usize {
        self.setters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setters.is_empty()
    }
}

type ErasedIndex = Arc<dyn Any + Send + Sync>;

static SETTER_INDEXES: OnceLock<DashMap<TypeId, ErasedIndex>> = OnceLock::new();

/// Get the setter index of `T`, building and publishing it on first use
///
/// Concurrent first callers may each build an index; exactly one is published
/// and every caller gets that one. A published index is never modified.
pub fn setter_index<T: Bindable>() -> Arc<SetterIndex<T>> {
    let indexes = SETTER_INDEXES.get_or_init(DashMap::new);
    let type_id = TypeId::of::<T>();

    let cached = indexes.get(&type_id).map(|entry| Arc::clone(entry.value()));
    let erased = match cached {
        Some(index) => index,
        None => {
            let built: ErasedIndex = Arc::new(SetterIndex::<T>::build());
            let published = indexes.entry(type_id).or_insert(built);
            Arc::clone(published.value())
        }
    };

    match erased.downcast::<SetterIndex<T>>() {
        Ok(index) => index,
        // Entries are keyed by TypeId, so the stored index always has type T.
        Err(_) => Arc::new(SetterIndex::<T>::build()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueKind;

    #[derive(Default)]
    struct Widget {
        max_wait: i64,
        min_idle: usize,
    }

    impl Bindable for Widget {
        fn property_setters() -> Vec<PropertySetter<Self>> {
            vec![
                PropertySetter::new("maxWait", |w: &mut Widget, v: i64| w.max_wait = v),
                PropertySetter::new("minIdle", |w: &mut Widget, v: usize| w.min_idle = v),
                PropertySetter::new("max-wait", |w: &mut Widget, v: i64| w.max_wait = v * 2),
            ]
        }
    }

    #[test]
    fn test_index_by_normalized_name() {
        let index = setter_index::<Widget>();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("MAXWAIT").unwrap().kind(), ValueKind::I64);
        assert_eq!(index.get("MINIDLE").unwrap().name(), "minIdle");
        assert!(index.get("maxWait").is_none());
        assert_eq!(index.property_names().collect::<Vec<_>>(), vec!["maxWait", "minIdle"]);
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let index = setter_index::<Widget>();
        let mut widget = Widget::default();
        index.get("MAXWAIT").unwrap().invoke(&mut widget, &5.into()).unwrap();
        assert_eq!(widget.max_wait, 5);
        assert_eq!(widget.min_idle, 0);
    }

    #[test]
    fn test_index_is_cached() {
        let first = setter_index::<Widget>();
        let second = setter_index::<Widget>();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_first_use_publishes_one_index() {
        struct Racy;
        impl Bindable for Racy {
            fn property_setters() -> Vec<PropertySetter<Self>> {
                vec![PropertySetter::new("flag", |_: &mut Racy, _: bool| {})]
            }
        }

        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(setter_index::<Racy>))
            .collect();
        let indexes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for index in &indexes {
            assert!(Arc::ptr_eq(index, &indexes[0]));
            assert_eq!(index.len(), 1);
        }
    }
}
