/// Rounds `value` up to the next multiple of the machine word size.
///
/// # Examples
///
/// ```rust
/// use firstfit::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Overflow-checked version of [`align!`].
///
/// Returns `None` when rounding `value` up would not fit in a `usize`.
pub fn align_up(value: usize) -> Option<usize> {
  let word = core::mem::size_of::<usize>();

  value.checked_add(word - 1).map(|v| v & !(word - 1))
}
