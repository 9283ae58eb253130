//! Representation converter registry.
//!
//! The registry maps `(source kind, target kind)` pairs to converter
//! functions. A conversion request succeeds whenever *any* chain of
//! registered converters links the source kind to the target kind; the chain
//! is found with a breadth-first search over the registered pairs, so the
//! shortest path wins.
//!
//! Converters must fully materialize their output (deep copy whatever they
//! need from the source). The registry hands the source in by reference and
//! takes the target out by value, so sibling representations of one data
//! object can never alias storage.

use std::any::{type_name, TypeId};
use std::collections::{HashMap, VecDeque};

use crate::data::Representation;
use crate::error::ConversionError;

type ConvertFn = Box<
    dyn Fn(&dyn Representation) -> Result<Box<dyn Representation>, ConversionError>
        + Send
        + Sync,
>;

struct RegisteredConverter {
    source: TypeId,
    target: TypeId,
    convert: ConvertFn,
}

/// Registry of representation converters, shared by data objects.
///
/// Built once at application startup and then only read, so it carries no
/// interior locking; data objects hold it behind an `Arc`.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: Vec<RegisteredConverter>,
    /// Source kind -> indices into `converters`, for the path search.
    by_source: HashMap<TypeId, Vec<usize>>,
    /// Human-readable names for error messages.
    names: HashMap<TypeId, &'static str>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter producing representations of kind `T` from kind
    /// `S`.
    ///
    /// If multiple converters cover the same pair, the first registered one
    /// is used.
    pub fn register<S, T, F>(&mut self, convert: F)
    where
        S: Representation,
        T: Representation,
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        let source = TypeId::of::<S>();
        let target = TypeId::of::<T>();
        self.names.insert(source, type_name::<S>());
        self.names.insert(target, type_name::<T>());

        let index = self.converters.len();
        self.converters.push(RegisteredConverter {
            source,
            target,
            convert: Box::new(move |repr| {
                let typed = repr.as_any().downcast_ref::<S>().ok_or(
                    ConversionError::ConverterMismatch {
                        produced: "<unknown source>",
                        expected: type_name::<S>(),
                    },
                )?;
                Ok(Box::new(convert(typed)))
            }),
        });
        self.by_source.entry(source).or_default().push(index);
    }

    /// Whether a chain of converters links `source` to `target`.
    pub fn can_convert(&self, source: TypeId, target: TypeId) -> bool {
        source == target || self.find_path(source, target).is_some()
    }

    /// Convert `source` into a representation of kind `target`.
    ///
    /// Walks the shortest registered converter chain. Fails with
    /// [`ConversionError::NoConverterPath`] if no chain exists.
    pub fn convert(
        &self,
        source: &dyn Representation,
        target: TypeId,
    ) -> Result<Box<dyn Representation>, ConversionError> {
        let source_kind = source.as_any().type_id();
        let path = self.find_path(source_kind, target).ok_or_else(|| {
            ConversionError::NoConverterPath {
                from: self.kind_name(source_kind),
                to: self.kind_name(target),
            }
        })?;

        let mut current: Option<Box<dyn Representation>> = None;
        for &step in &path {
            let converter = &self.converters[step];
            let input: &dyn Representation = match &current {
                Some(boxed) => boxed.as_ref(),
                None => source,
            };
            current = Some((converter.convert)(input)?);
        }
        // The path is non-empty: source kind == target kind is handled by the
        // caller without consulting the registry.
        current.ok_or(ConversionError::NoConverterPath {
            from: self.kind_name(source_kind),
            to: self.kind_name(target),
        })
    }

    /// Breadth-first search over registered converter edges.
    ///
    /// Returns the converter indices to apply in order, or `None` if the
    /// target kind is unreachable.
    fn find_path(&self, source: TypeId, target: TypeId) -> Option<Vec<usize>> {
        if source == target {
            return None;
        }

        let mut came_from: HashMap<TypeId, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(source);

        while let Some(kind) = queue.pop_front() {
            let Some(edges) = self.by_source.get(&kind) else {
                continue;
            };
            for &index in edges {
                let next = self.converters[index].target;
                if next == source || came_from.contains_key(&next) {
                    continue;
                }
                came_from.insert(next, index);
                if next == target {
                    // Walk the chain backwards to the source.
                    let mut path = vec![index];
                    let mut at = self.converters[index].source;
                    while at != source {
                        let step = came_from[&at];
                        path.push(step);
                        at = self.converters[step].source;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    fn kind_name(&self, kind: TypeId) -> &'static str {
        self.names.get(&kind).copied().unwrap_or("<unregistered>")
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.converters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::representation::test_support::{DiskStub, RamBuffer, TextureBuffer};

    fn registry() -> ConverterRegistry {
        let mut registry = ConverterRegistry::new();
        registry.register(|disk: &DiskStub| RamBuffer::filled(disk.dimensions, disk.fill));
        registry.register(|ram: &RamBuffer| TextureBuffer {
            dimensions: ram.dimensions,
            texels: ram.values.clone(),
        });
        registry.register(|tex: &TextureBuffer| RamBuffer {
            dimensions: tex.dimensions,
            values: tex.texels.clone(),
        });
        registry
    }

    #[test]
    fn direct_conversion() {
        let registry = registry();
        let ram = RamBuffer::filled([2, 2, 1], 3.0);

        let converted = registry
            .convert(&ram, TypeId::of::<TextureBuffer>())
            .unwrap();
        let texture = converted
            .as_any()
            .downcast_ref::<TextureBuffer>()
            .unwrap();
        assert_eq!(texture.texels, vec![3.0; 4]);
    }

    #[test]
    fn multi_hop_conversion() {
        let registry = registry();
        let disk = DiskStub {
            dimensions: [2, 1, 1],
            fill: 7.0,
        };

        // Disk -> RAM -> texture takes two hops.
        let converted = registry
            .convert(&disk, TypeId::of::<TextureBuffer>())
            .unwrap();
        let texture = converted
            .as_any()
            .downcast_ref::<TextureBuffer>()
            .unwrap();
        assert_eq!(texture.texels, vec![7.0, 7.0]);
    }

    #[test]
    fn missing_path_is_typed_error() {
        let registry = registry();
        let ram = RamBuffer::filled([1, 1, 1], 0.0);

        // Nothing converts back to a disk stub.
        let err = registry
            .convert(&ram, TypeId::of::<DiskStub>())
            .err()
            .unwrap();
        assert!(matches!(err, ConversionError::NoConverterPath { .. }));
    }

    #[test]
    fn can_convert_reports_reachability() {
        let registry = registry();
        assert!(registry.can_convert(TypeId::of::<DiskStub>(), TypeId::of::<TextureBuffer>()));
        assert!(!registry.can_convert(TypeId::of::<RamBuffer>(), TypeId::of::<DiskStub>()));
        // Identity is always convertible.
        assert!(registry.can_convert(TypeId::of::<RamBuffer>(), TypeId::of::<RamBuffer>()));
    }
}
