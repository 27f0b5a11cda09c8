mod helpers;
mod invalidation;

pub(crate) use helpers::*;
