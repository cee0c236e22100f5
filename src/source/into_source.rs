use super::Source;

/// Conversion into a [`Source`].
///
/// The engine entry points are generic over this trait so plain collections
/// can stand in for sources at call sites.
pub trait IntoSource {
    /// The type of the elements in the source.
    type Item;

    /// Convert `self` into a source.
    fn into_source(self) -> Source<Self::Item>;
}

impl<T: 'static> IntoSource for Source<T> {
    type Item = T;

    fn into_source(self) -> Source<T> {
        self
    }
}

impl<T: 'static> IntoSource for Vec<T> {
    type Item = T;

    fn into_source(self) -> Source<T> {
        Source::from_iter(self)
    }
}

impl<T: 'static, const N: usize> IntoSource for [T; N] {
    type Item = T;

    fn into_source(self) -> Source<T> {
        Source::from_iter(self)
    }
}
