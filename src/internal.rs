mod inbox;
mod strand;

pub(crate) use inbox::Inbox;
pub(crate) use strand::{Op, Strand};
