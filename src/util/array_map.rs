use std::fmt::{Debug};
use std::hash::{Hash};
use std::marker::{PhantomData};

/**
 * Internally represented as a small integer that is usable as an array index.
 */
pub trait AsUsize: Debug + Copy + Hash + Eq {
    fn as_usize(self) -> usize;
}

/**
 * A map that is implemented as an array.
 * This is preferable to a HashMap when the keys are dense, as is the case for
 * [`Register`]s and thread priorities.
 *
 * [`Register`]: crate::compiler::Register
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayMap<K: AsUsize, V>(
    Box<[V]>,
    PhantomData<K>,
);

impl<K: AsUsize, V> ArrayMap<K, V> {
    pub fn new(length: usize) -> Self where V: Default {
        Self::new_with(length, Default::default)
    }

    pub fn new_with(length: usize, f: impl Fn() -> V) -> Self {
        ArrayMap(
            (0..length).map(|_| f()).collect(),
            PhantomData,
        )
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /** Tests whether `key` is in range. */
    pub fn contains_key(&self, key: K) -> bool { key.as_usize() < self.0.len() }

    /** Returns the value for `key`, or `None` if `key` is out of range. */
    pub fn get(&self, key: K) -> Option<&V> { self.0.get(key.as_usize()) }

    /** Returns the value for `key`, or `None` if `key` is out of range. */
    pub fn get_mut(&mut self, key: K) -> Option<&mut V> { self.0.get_mut(key.as_usize()) }

    /** Overwrite every value with `f()`. */
    pub fn fill_with(&mut self, f: impl Fn() -> V) {
        for v in self.0.iter_mut() { *v = f(); }
    }

    pub fn iter(&self) -> std::slice::Iter<V> { self.0.iter() }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<V> { self.0.iter_mut() }
}

impl<K: AsUsize, V> AsRef<[V]> for ArrayMap<K, V> {
    fn as_ref(&self) -> &[V] { self.0.as_ref() }
}

impl<K: AsUsize, V> AsMut<[V]> for ArrayMap<K, V> {
    fn as_mut(&mut self) -> &mut [V] { self.0.as_mut() }
}

impl<K: AsUsize, V> std::ops::Index<K> for ArrayMap<K, V> {
    type Output = V;

    fn index(&self, index: K) -> &V {
        &self.0[index.as_usize()]
    }
}

impl<K: AsUsize, V> std::ops::IndexMut<K> for ArrayMap<K, V> {
    fn index_mut(&mut self, index: K) -> &mut V {
        &mut self.0[index.as_usize()]
    }
}

//-----------------------------------------------------------------------------
