use super::{Hook, Trigger};
use crate::core::process::ProcessRecord;

/// The value a criterion compares, borrowed from either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field<'a> {
    Text(&'a str),
    Number(i64),
}

impl Field<'_> {
    fn is_unset(&self) -> bool {
        match self {
            Field::Text(s) => s.is_empty(),
            Field::Number(n) => *n == 0,
        }
    }
}

struct Criterion {
    name: &'static str,
    rule: for<'a> fn(&'a Trigger) -> Field<'a>,
    record: for<'a> fn(&'a ProcessRecord) -> Field<'a>,
}

fn rule_status(t: &Trigger) -> Field<'_> {
    Field::Text(&t.status)
}
fn rule_process_type(t: &Trigger) -> Field<'_> {
    Field::Text(&t.process_type)
}
fn rule_task_name(t: &Trigger) -> Field<'_> {
    Field::Text(&t.task_name)
}
fn rule_account_id(t: &Trigger) -> Field<'_> {
    Field::Number(t.account_id)
}
fn rule_created_by(t: &Trigger) -> Field<'_> {
    Field::Text(&t.created_by)
}

fn record_status(p: &ProcessRecord) -> Field<'_> {
    Field::Text(&p.status)
}
fn record_process_type(p: &ProcessRecord) -> Field<'_> {
    Field::Text(&p.process_type_name)
}
fn record_task_name(p: &ProcessRecord) -> Field<'_> {
    Field::Text(&p.task_name)
}
fn record_account_id(p: &ProcessRecord) -> Field<'_> {
    Field::Number(p.account_id)
}
fn record_created_by(p: &ProcessRecord) -> Field<'_> {
    Field::Text(&p.created_by)
}

/// Trigger criteria in evaluation order. `processType` compares against the
/// resolved display name.
const CRITERIA: [Criterion; 5] = [
    Criterion {
        name: "status",
        rule: rule_status,
        record: record_status,
    },
    Criterion {
        name: "processType",
        rule: rule_process_type,
        record: record_process_type,
    },
    Criterion {
        name: "taskName",
        rule: rule_task_name,
        record: record_task_name,
    },
    Criterion {
        name: "accountId",
        rule: rule_account_id,
        record: record_account_id,
    },
    Criterion {
        name: "createdBy",
        rule: rule_created_by,
        record: record_created_by,
    },
];

/// Names of the criteria a trigger sets, in evaluation order.
pub fn set_criteria(trigger: &Trigger) -> Vec<&'static str> {
    CRITERIA
        .iter()
        .filter(|c| !(c.rule)(trigger).is_unset())
        .map(|c| c.name)
        .collect()
}

/// Decides whether `hook` fires for a settled `process`.
///
/// Every criterion set on the trigger must equal the record's field, and at
/// least one must be set. A record field that is empty or zero never
/// satisfies a criterion. In-flight records never match.
pub fn evaluate(process: &ProcessRecord, hook: &Hook) -> bool {
    if process.is_executing() {
        return false;
    }

    let mut any_set = false;
    for criterion in &CRITERIA {
        let wanted = (criterion.rule)(&hook.triggers);
        if wanted.is_unset() {
            continue;
        }
        any_set = true;

        let actual = (criterion.record)(process);
        if actual.is_unset() || actual != wanted {
            return false;
        }
    }
    any_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::STATUS_EXECUTING;

    fn hook(triggers: Trigger) -> Hook {
        Hook {
            description: "test hook".to_string(),
            url: "https://example.com/hook".to_string(),
            method: "GET".to_string(),
            triggers,
            ..Default::default()
        }
    }

    fn full_process() -> ProcessRecord {
        ProcessRecord {
            id: 10,
            status: "complete".to_string(),
            process_type_name: "local workflow".to_string(),
            task_name: "Test task".to_string(),
            account_id: 1,
            created_by: "Testuser".to_string(),
            ..Default::default()
        }
    }

    struct Case {
        name: &'static str,
        process: ProcessRecord,
        triggers: Trigger,
        want: bool,
    }

    #[test]
    fn single_criterion_rules() {
        let cases = vec![
            Case {
                name: "fires on status complete",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    status: "complete".to_string(),
                    ..Default::default()
                },
                want: true,
            },
            Case {
                name: "status complete does not match failed trigger",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    status: "failed".to_string(),
                    ..Default::default()
                },
                want: false,
            },
            Case {
                name: "never fires on executing",
                process: ProcessRecord {
                    status: STATUS_EXECUTING.to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    status: STATUS_EXECUTING.to_string(),
                    ..Default::default()
                },
                want: false,
            },
            Case {
                name: "fires for process type name",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    process_type_name: "local workflow".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    process_type: "local workflow".to_string(),
                    ..Default::default()
                },
                want: true,
            },
            Case {
                name: "reconfigure trigger ignores local workflow",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    process_type_name: "local workflow".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    process_type: "reconfigure".to_string(),
                    ..Default::default()
                },
                want: false,
            },
            Case {
                name: "fires for task name",
                process: ProcessRecord {
                    status: "failed".to_string(),
                    task_name: "Test task".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    task_name: "Test task".to_string(),
                    ..Default::default()
                },
                want: true,
            },
            Case {
                name: "task name trigger needs the record to carry a task",
                process: ProcessRecord {
                    status: "failed".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    task_name: "Test task".to_string(),
                    ..Default::default()
                },
                want: false,
            },
            Case {
                name: "fires for account id",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    account_id: 1,
                    ..Default::default()
                },
                triggers: Trigger {
                    account_id: 1,
                    ..Default::default()
                },
                want: true,
            },
            Case {
                name: "account 1 does not match trigger for account 2",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    account_id: 1,
                    ..Default::default()
                },
                triggers: Trigger {
                    account_id: 2,
                    ..Default::default()
                },
                want: false,
            },
            Case {
                name: "record without an account does not match account trigger",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    account_id: 2,
                    ..Default::default()
                },
                want: false,
            },
            Case {
                name: "record without a process type does not match type trigger",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    process_type: "local workflow".to_string(),
                    ..Default::default()
                },
                want: false,
            },
            Case {
                name: "record without a creator does not match created by trigger",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    created_by: "admin".to_string(),
                    ..Default::default()
                },
                want: false,
            },
            Case {
                name: "fires for created by",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    created_by: "Testuser".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    created_by: "Testuser".to_string(),
                    ..Default::default()
                },
                want: true,
            },
            Case {
                name: "Testuser does not match trigger for admin",
                process: ProcessRecord {
                    status: "complete".to_string(),
                    created_by: "Testuser".to_string(),
                    ..Default::default()
                },
                triggers: Trigger {
                    created_by: "admin".to_string(),
                    ..Default::default()
                },
                want: false,
            },
        ];

        for case in cases {
            assert_eq!(
                evaluate(&case.process, &hook(case.triggers)),
                case.want,
                "{}",
                case.name
            );
        }
    }

    #[test]
    fn all_set_criteria_must_match() {
        let process = full_process();

        let everything = Trigger {
            status: "complete".to_string(),
            process_type: "local workflow".to_string(),
            task_name: "Test task".to_string(),
            account_id: 1,
            created_by: "Testuser".to_string(),
        };
        assert!(evaluate(&process, &hook(everything.clone())));

        let wrong_account = Trigger {
            account_id: 2,
            ..everything.clone()
        };
        assert!(!evaluate(&process, &hook(wrong_account)));

        let wrong_user = Trigger {
            created_by: "admin".to_string(),
            ..everything.clone()
        };
        assert!(!evaluate(&process, &hook(wrong_user)));

        let wrong_status = Trigger {
            status: "failed".to_string(),
            ..everything
        };
        assert!(!evaluate(&process, &hook(wrong_status)));
    }

    #[test]
    fn status_match_with_account_mismatch_does_not_fire() {
        let process = ProcessRecord {
            status: "complete".to_string(),
            account_id: 3,
            ..Default::default()
        };
        let triggers = Trigger {
            status: "complete".to_string(),
            account_id: 2,
            ..Default::default()
        };
        assert!(!evaluate(&process, &hook(triggers)));
    }

    #[test]
    fn pairs_of_criteria_fire_only_together() {
        let process = full_process();

        let task_and_type = Trigger {
            task_name: "Test task".to_string(),
            process_type: "local workflow".to_string(),
            ..Default::default()
        };
        assert!(evaluate(&process, &hook(task_and_type)));

        let task_with_other_type = Trigger {
            task_name: "Test task".to_string(),
            process_type: "reconfigure".to_string(),
            ..Default::default()
        };
        assert!(!evaluate(&process, &hook(task_with_other_type)));

        let user_on_empty_task = Trigger {
            created_by: "Testuser".to_string(),
            task_name: "Test task".to_string(),
            ..Default::default()
        };
        let untasked = ProcessRecord {
            task_name: String::new(),
            ..full_process()
        };
        assert!(!evaluate(&untasked, &hook(user_on_empty_task)));
    }

    #[test]
    fn executing_record_never_fires_on_any_criterion() {
        let process = ProcessRecord {
            status: STATUS_EXECUTING.to_string(),
            ..full_process()
        };
        let triggers = Trigger {
            task_name: "Test task".to_string(),
            ..Default::default()
        };
        assert!(!evaluate(&process, &hook(triggers)));
    }

    #[test]
    fn empty_trigger_never_fires() {
        assert!(!evaluate(&full_process(), &hook(Trigger::default())));
    }

    #[test]
    fn set_criteria_lists_in_evaluation_order() {
        let triggers = Trigger {
            created_by: "admin".to_string(),
            status: "failed".to_string(),
            account_id: 4,
            ..Default::default()
        };
        assert_eq!(
            set_criteria(&triggers),
            vec!["status", "accountId", "createdBy"]
        );
        assert!(set_criteria(&Trigger::default()).is_empty());
    }
}
