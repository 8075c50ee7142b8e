// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for the WHERE-clause and ORDER BY parsers.
// Run with: cargo +nightly fuzz run fuzz_where_parser
//
// Invalid input must come back as a QueryError, never a panic or a stack
// overflow from deeply nested parentheses.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tierstore_query::{OrderBy, Record, WhereClause};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if input.len() <= 4096 {
            if let Ok(clause) = WhereClause::parse(input) {
                // Binding with no arguments succeeds only for clauses without `?`.
                if let Ok(args) = clause.bind(&[]) {
                    let _ = clause.condition.test(&Record::new("fuzz"), &args);
                }
            }
            let _ = input.parse::<OrderBy>();
        }
    }
});
