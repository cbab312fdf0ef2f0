pub(crate) mod units;

#[cfg(test)]
pub(crate) mod test_helpers {
	macro_rules! non_zero {
		($num:expr) => {
			std::num::NonZero::<_>::new($num).unwrap()
		};
	}
	pub(crate) use non_zero;
}
