pub mod delete;
pub mod delete_many;
pub mod init;
pub mod list;
pub mod purge;
pub mod upload;
pub mod versions;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Write a new configuration file
    Init(init::InitArgs),
    /// Upload a local file and print its public URL
    Upload(upload::UploadArgs),
    /// Delete a single object
    Delete(delete::DeleteArgs),
    /// Delete up to 1000 objects in one request
    DeleteMany(delete_many::DeleteManyArgs),
    /// List objects in a bucket
    List(list::ListArgs),
    /// List object versions in a bucket
    Versions(versions::VersionsArgs),
    /// Delete every object matching a prefix and/or pattern
    Purge(purge::PurgeArgs),
}
