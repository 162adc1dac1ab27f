use std::time::Duration;

/// Overwrites a value with the state of another instance of the same type,
/// reusing the existing allocation where there is one.
pub trait InPlaceCopy {
    fn copy_from(&mut self, src: &Self);
}

macro_rules! impl_in_place_copy {
    ($($ty:ty),* $(,)?) => {
        $(
            impl InPlaceCopy for $ty {
                #[inline]
                fn copy_from(&mut self, src: &Self) {
                    *self = *src;
                }
            }
        )*
    };
}

impl_in_place_copy!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char,
    Duration,
);

impl<T: InPlaceCopy, const N: usize> InPlaceCopy for [T; N] {
    fn copy_from(&mut self, src: &Self) {
        for (dst, src) in self.iter_mut().zip(src) {
            dst.copy_from(src);
        }
    }
}

/// Copies element-wise over the common prefix, only the tail is cloned.
impl<T: InPlaceCopy + Clone> InPlaceCopy for Vec<T> {
    fn copy_from(&mut self, src: &Self) {
        self.truncate(src.len());
        let common = self.len();
        for (dst, src) in self.iter_mut().zip(src) {
            dst.copy_from(src);
        }
        self.extend_from_slice(&src[common..]);
    }
}

impl InPlaceCopy for String {
    fn copy_from(&mut self, src: &Self) {
        self.clear();
        self.push_str(src);
    }
}

impl<T: InPlaceCopy + Clone> InPlaceCopy for Option<T> {
    fn copy_from(&mut self, src: &Self) {
        if let (Some(dst), Some(src)) = (self.as_mut(), src) {
            dst.copy_from(src);
            return;
        }
        *self = src.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_primitives_and_arrays() {
        let mut x = 0u64;
        x.copy_from(&42);
        assert_eq!(x, 42);

        let mut pose = [0.0f64; 3];
        pose.copy_from(&[1.0, 2.0, 3.0]);
        assert_eq!(pose, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_vec_reuses_allocation() {
        let mut dst = Vec::with_capacity(16);
        dst.extend([9u32; 8]);
        let ptr = dst.as_ptr();

        dst.copy_from(&vec![1, 2, 3]);
        assert_eq!(dst, vec![1, 2, 3]);
        assert_eq!(dst.as_ptr(), ptr);

        dst.copy_from(&vec![4, 5, 6, 7, 8]);
        assert_eq!(dst, vec![4, 5, 6, 7, 8]);
        assert_eq!(dst.as_ptr(), ptr);
    }

    #[test]
    fn test_string_and_option() {
        let mut s = String::from("previous");
        s.copy_from(&String::from("next"));
        assert_eq!(s, "next");

        let mut opt = None;
        opt.copy_from(&Some(3u8));
        assert_eq!(opt, Some(3));
        opt.copy_from(&Some(4));
        assert_eq!(opt, Some(4));
        opt.copy_from(&None);
        assert_eq!(opt, None);
    }
}
