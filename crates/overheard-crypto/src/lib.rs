/// Overheard Crypto Library
///
/// Keyed derivation of short deeplink codes and content hashing of the
/// consent policy. Nothing here is reversible without the process secret.

pub mod deeplink;
pub mod policy;
