use crate::module::options::StorageOptions;
use structopt::StructOpt;

/// Options for the query module
#[derive(Debug, StructOpt)]
pub struct Options {
    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub storage: StorageOptions,
}
