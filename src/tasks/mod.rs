pub mod poll_closer;
