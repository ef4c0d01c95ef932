pub mod feedback;
pub mod poster;
pub mod recommendation;
