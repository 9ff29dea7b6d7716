pub mod images;
pub mod videos;
