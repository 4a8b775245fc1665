pub mod album;
pub mod mv;
pub mod playlist;
pub mod station;
pub mod track;
