/// Scale `v` to unit L2 norm in place. All-zero vectors are left alone.
pub(crate) fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv_norm = norm_sq.sqrt().recip();
        v.iter_mut().for_each(|x| *x *= inv_norm);
    }
}
