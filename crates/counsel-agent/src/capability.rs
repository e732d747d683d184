//! Advising executor catalog
//!
//! What each domain executor can and cannot do. The planner renders this
//! into its prompt and prompted executors use their own entry as a role
//! description.

use counsel_core::ExecutorId;

pub const PROGRAMS_REQUIREMENTS: &str = "programs_requirements";
pub const COURSE_SCHEDULING: &str = "course_scheduling";
pub const POLICY_COMPLIANCE: &str = "policy_compliance";
pub const ACADEMIC_PLANNING: &str = "academic_planning";

/// Executors allowed to propose plan options, in order of preference
pub const PROPOSERS: [&str; 2] = [ACADEMIC_PLANNING, PROGRAMS_REQUIREMENTS];

/// The executor that critiques proposals
pub const CRITIC: &str = POLICY_COMPLIANCE;

/// Static description of one executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub id: &'static str,
    pub name: &'static str,
    pub role: &'static str,
    pub capabilities: &'static [&'static str],
    pub knowledge_domains: &'static [&'static str],
    pub limitations: &'static [&'static str],
    /// Whether this executor is expected to return plan options
    pub proposes_plans: bool,
}

impl Capability {
    pub fn executor_id(&self) -> ExecutorId {
        ExecutorId::from(self.id)
    }

    /// Multi-line description used inside prompts
    pub fn describe(&self) -> String {
        let bullets = |items: &[&str]| {
            items
                .iter()
                .map(|i| format!("  - {}", i))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "Agent: {} ({})\nRole: {}\n\nCapabilities:\n{}\n\nKnowledge Domains:\n{}\n\nLimitations:\n{}\n",
            self.name,
            self.id,
            self.role,
            bullets(self.capabilities),
            bullets(self.knowledge_domains),
            bullets(self.limitations),
        )
    }
}

static CATALOG: [Capability; 4] = [
    Capability {
        id: PROGRAMS_REQUIREMENTS,
        name: "Programs Requirements Agent",
        role: "Academic program specialist",
        capabilities: &[
            "Validate if a course plan satisfies major/minor requirements",
            "Check degree progress toward graduation",
            "Explain what courses are needed for a specific program",
            "Propose semester-by-semester plans",
            "Identify missing requirements",
        ],
        knowledge_domains: &[
            "Major requirements",
            "Minor requirements",
            "Degree structures",
            "Course substitutions and equivalencies",
        ],
        limitations: &[
            "Does NOT know course prerequisites, content or schedule",
            "Does NOT know university-wide policies",
            "Cannot check time conflicts or course availability",
        ],
        proposes_plans: true,
    },
    Capability {
        id: COURSE_SCHEDULING,
        name: "Course Scheduling Agent",
        role: "Course information specialist",
        capabilities: &[
            "Provide detailed information about specific courses",
            "Explain prerequisites, corequisites and anti-requisites",
            "Check when courses are offered",
            "Identify time conflicts between courses",
            "Suggest alternative courses if conflicts exist",
        ],
        knowledge_domains: &[
            "Course catalog",
            "Course prerequisites and dependencies",
            "Course schedules and offerings",
        ],
        limitations: &[
            "Does NOT know if a course satisfies major requirements",
            "Does NOT know university policies about units or overload",
            "Cannot validate degree progress",
        ],
        proposes_plans: false,
    },
    Capability {
        id: POLICY_COMPLIANCE,
        name: "Policy Compliance Agent",
        role: "University policy specialist",
        capabilities: &[
            "Check if a plan complies with university policies",
            "Explain unit limits, overload policies and GPA requirements",
            "Validate registration rules",
            "Flag policy violations and suggest fixes",
        ],
        knowledge_domains: &[
            "University-wide academic policies",
            "Registration and grading policies",
            "Financial policies",
        ],
        limitations: &[
            "Does NOT know course-specific details",
            "Does NOT know program-specific requirements",
            "Cannot propose course plans (only validate them)",
        ],
        proposes_plans: false,
    },
    Capability {
        id: ACADEMIC_PLANNING,
        name: "Academic Planning Agent",
        role: "Multi-semester course planning specialist",
        capabilities: &[
            "Generate semester-by-semester plans from current status to graduation",
            "Balance workload across semesters (typically 45-54 units)",
            "Order prerequisite courses correctly",
            "Integrate minor requirements into graduation plans",
            "Create multiple plan options with different strategies",
            "Flag risky semesters",
        ],
        knowledge_domains: &[
            "Program requirements and sample curricula",
            "Course offering patterns",
            "Workload balancing strategies",
        ],
        limitations: &[
            "Cannot validate policy compliance",
            "Cannot guarantee course availability in future semesters",
        ],
        proposes_plans: true,
    },
];

/// Every known advising executor
pub fn catalog() -> &'static [Capability] {
    &CATALOG
}

pub fn lookup(id: &ExecutorId) -> Option<&'static Capability> {
    CATALOG.iter().find(|c| c.id == id.as_str())
}

/// Prompt section describing the given executors, catalog order
pub fn describe_all(ids: &[ExecutorId]) -> String {
    CATALOG
        .iter()
        .filter(|c| ids.iter().any(|id| id.as_str() == c.id))
        .map(Capability::describe)
        .collect::<Vec<_>>()
        .join("\n")
}
