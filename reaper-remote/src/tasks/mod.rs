pub(crate) mod poll;
