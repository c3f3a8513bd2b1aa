use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("cannot open the store")]
    Store,
    #[display("cannot reach the listing API")]
    Remote,
    #[display("sync failed")]
    Sync,
    #[display("background page fetch did not finish")]
    Task,
}
