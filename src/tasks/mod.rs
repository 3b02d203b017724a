mod sweeper;

pub use sweeper::StaleConnectionSweeper;
