mod artifacts;
mod build;
mod parse;

pub(crate) use artifacts::{clean, package, CleanArgs, PackageArgs};
pub(crate) use build::{build, resolve_version};
pub(crate) use parse::BuildArgs;
