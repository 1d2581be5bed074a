mod helpers;

mod append_tests;
mod trim_tests;
