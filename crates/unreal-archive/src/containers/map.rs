//! Ordered key/value lists

use crate::archive::{Archive, Serializable};
use crate::error::Result;
use crate::type_info::TypeInfo;

use super::{ArrayStorage, StaticArray, TArray};

/// One entry of a key/value list; serialized as key then value
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MapPair<K, V> {
    /// Key
    pub key: K,
    /// Value
    pub value: V,
}

impl<K: Serializable, V: Serializable> Serializable for MapPair<K, V> {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        self.key.serialize(ar)?;
        self.value.serialize(ar)
    }
}

impl<K, V> TypeInfo for MapPair<K, V> {}

/// Key/value list with linear lookup
///
/// Insertion order is preserved and is the serialization order. Duplicate
/// keys are allowed; lookups return the first match.
#[derive(Debug, PartialEq, Eq)]
pub struct TMap<K, V> {
    pairs: TArray<MapPair<K, V>>,
}

impl<K, V> Default for TMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TMap<K, V> {
    /// Create an empty map
    pub const fn new() -> Self {
        Self {
            pairs: TArray::new(),
        }
    }

    /// Append a pair
    pub fn add(&mut self, key: K, value: V) -> usize {
        self.pairs.add(MapPair { key, value })
    }

    /// Value of the first pair with `key`
    pub fn find(&self, key: &K) -> Option<&V>
    where
        K: PartialEq,
    {
        self.pairs.iter().find(|p| &p.key == key).map(|p| &p.value)
    }

    /// Mutable value of the first pair with `key`
    pub fn find_mut(&mut self, key: &K) -> Option<&mut V>
    where
        K: PartialEq,
    {
        self.pairs
            .iter_mut()
            .find(|p| &p.key == key)
            .map(|p| &mut p.value)
    }

    /// Whether a pair with `key` exists
    pub fn contains_key(&self, key: &K) -> bool
    where
        K: PartialEq,
    {
        self.find(key).is_some()
    }

    /// Remove the first pair with `key`, keeping the order of the others
    pub fn remove(&mut self, key: &K) -> Option<V>
    where
        K: PartialEq,
    {
        let index = self.pairs.iter().position(|p| &p.key == key)?;
        self.pairs.remove(index).map(|p| p.value)
    }

    /// Pairs in insertion order
    pub fn pairs(&self) -> &[MapPair<K, V>] {
        &self.pairs
    }

    /// Iterate over `(key, value)` in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.pairs.iter().map(|p| (&p.key, &p.value))
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.pairs.as_slice().len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.pairs.as_slice().is_empty()
    }

    /// Explicit deep copy
    #[must_use]
    pub fn duplicate(&self) -> Self
    where
        K: Clone,
        V: Clone,
    {
        Self {
            pairs: self.pairs.duplicate(),
        }
    }
}

impl<K, V> Serializable for TMap<K, V>
where
    K: Serializable + Default,
    V: Serializable + Default,
{
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        self.pairs.serialize(ar)
    }
}

impl<K, V> TypeInfo for TMap<K, V> {}

/// Key/value list with inline storage for up to `N` pairs
#[derive(Debug)]
pub struct StaticMap<K, V, const N: usize> {
    pairs: StaticArray<MapPair<K, V>, N>,
}

impl<K: Default, V: Default, const N: usize> Default for StaticMap<K, V, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Default, V: Default, const N: usize> StaticMap<K, V, N> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            pairs: StaticArray::new(),
        }
    }

    /// Append a pair; fails when the inline storage is full
    pub fn add(&mut self, key: K, value: V) -> Result<usize> {
        self.pairs.add(MapPair { key, value })
    }

    /// Value of the first pair with `key`
    pub fn find(&self, key: &K) -> Option<&V>
    where
        K: PartialEq,
    {
        self.pairs.iter().find(|p| &p.key == key).map(|p| &p.value)
    }

    /// Pairs in insertion order
    pub fn pairs(&self) -> &[MapPair<K, V>] {
        &self.pairs
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        ArrayStorage::len(&self.pairs)
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        ArrayStorage::is_empty(&self.pairs)
    }
}

impl<K, V, const N: usize> Serializable for StaticMap<K, V, N>
where
    K: Serializable + Default,
    V: Serializable + Default,
{
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        self.pairs.serialize(ar)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::{MemReader, MemWriter, SerializeExt};
    use crate::containers::FString;
    use crate::error::ArchiveError;

    #[test]
    fn test_insertion_order_is_serialization_order() {
        let mut map = TMap::new();
        map.add(30i32, 1u8);
        map.add(10, 2);
        map.add(20, 3);

        let mut writer = MemWriter::new();
        writer.transfer(&mut map).unwrap();
        assert_eq!(
            writer.as_bytes(),
            &[3, 0, 0, 0, 30, 0, 0, 0, 1, 10, 0, 0, 0, 2, 20, 0, 0, 0, 3]
        );

        let bytes = writer.into_inner();
        let mut reader = MemReader::new(&bytes);
        let decoded: TMap<i32, u8> = reader.load().unwrap();
        let keys: Vec<i32> = decoded.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![30, 10, 20]);
        assert_eq!(decoded, map.duplicate());
    }

    #[test]
    fn test_linear_lookup() {
        let mut map: TMap<FString, i32> = TMap::new();
        map.add(FString::new("Mesh"), 1);
        map.add(FString::new("Skin"), 2);
        map.add(FString::new("Mesh"), 3);

        assert_eq!(map.find(&FString::new("Mesh")), Some(&1));
        *map.find_mut(&FString::new("Skin")).unwrap() = 5;
        assert_eq!(map.remove(&FString::new("Skin")), Some(5));
        assert!(!map.contains_key(&FString::new("Skin")));
        assert_eq!(map.len(), 2);
        assert_eq!(map.pairs()[1].value, 3);
    }

    #[test]
    fn test_static_map_capacity() {
        let mut map: StaticMap<u8, u8, 2> = StaticMap::new();
        map.add(1, 1).unwrap();
        map.add(2, 4).unwrap();
        assert!(matches!(
            map.add(3, 9),
            Err(ArchiveError::CapacityExceeded { .. })
        ));
        assert_eq!(map.find(&2), Some(&4));

        let mut writer = MemWriter::new();
        writer.transfer(&mut map).unwrap();
        let bytes = writer.into_inner();
        let mut reader = MemReader::new(&bytes);
        let decoded: StaticMap<u8, u8, 2> = reader.load().unwrap();
        assert_eq!(decoded.pairs(), map.pairs());
    }
}
