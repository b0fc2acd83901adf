#[cfg(test)]
// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod helpers;
pub mod layout_tests;
pub mod commit_tests;
