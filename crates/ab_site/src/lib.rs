pub mod images;
pub mod post;
pub mod publish;

pub use images::{image_file_name, resize_in_place, ImageAcquirer};
pub use post::{slugify, AssemblyOutcome, PostAssembler};
pub use publish::{classify_git_error, commit_message, GitPublisher, NoopPublisher, PublishReceipt, Publisher};

pub mod prelude {
    pub use crate::images::ImageAcquirer;
    pub use crate::post::{AssemblyOutcome, PostAssembler};
    pub use crate::publish::{GitPublisher, NoopPublisher, Publisher};
}
