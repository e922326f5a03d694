// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Static course catalog.
//!
//! Course content lives elsewhere; the service only needs stable identifiers
//! to validate enrollment choices made during access approval.

use serde::Serialize;

/// A course that trainees can be enrolled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Course {
    pub id: &'static str,
    pub title: &'static str,
}

/// All assignable courses.
pub const CATALOG: &[Course] = &[
    Course {
        id: "onboarding-101",
        title: "Company Onboarding",
    },
    Course {
        id: "security-awareness",
        title: "Security Awareness",
    },
    Course {
        id: "data-privacy",
        title: "Data Privacy Essentials",
    },
    Course {
        id: "leadership-foundations",
        title: "Leadership Foundations",
    },
    Course {
        id: "customer-excellence",
        title: "Customer Excellence",
    },
    Course {
        id: "ai-productivity",
        title: "Working with AI Assistants",
    },
];

/// Look up a catalog course by ID.
pub fn find(id: &str) -> Option<&'static Course> {
    CATALOG.iter().find(|c| c.id == id)
}
