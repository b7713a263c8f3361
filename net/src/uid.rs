//! Private utility module for working with UIDs

use std::borrow::Cow;

/// Remove the trailing NUL padding of a UID,
/// as found in values read from the wire.
pub(crate) fn trim_uid<'a>(uid: impl Into<Cow<'a, str>>) -> Cow<'a, str> {
    let uid = uid.into();
    if uid.ends_with('\0') {
        Cow::Owned(uid.trim_end_matches('\0').to_string())
    } else {
        uid
    }
}
