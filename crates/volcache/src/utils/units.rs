pub(crate) const B: usize = 1;
pub(crate) const KIB: usize = 1024 * B;
pub(crate) const MIB: usize = 1024 * KIB;
