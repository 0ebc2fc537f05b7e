/// Native signature of an elementwise-map kernel.
///
/// This represents a function that:
/// - Takes a destination pointer, a source pointer and an element count
/// - Writes `f(src[i])` to `dst[i]` for every `i < n`
/// - Reads and writes nothing else
pub type MapFn = unsafe extern "C" fn(dst: *mut f32, src: *const f32, n: usize);

/// Native signature of a reduce-sum kernel.
///
/// This represents a function that:
/// - Takes a source pointer and an element count
/// - Returns the sum of `f(src[i])` over every `i < n`, in lane-parallel order
pub type ReduceFn = unsafe extern "C" fn(src: *const f32, n: usize) -> f32;
