//! Pure computations over the in-memory collections: grade banding, subject
//! totals, broadsheet ranking, fee balances, period financials and attendance
//! tallies. No storage concerns here; plain slices in, values out.

use std::cmp::Ordering;

use serde::Serialize;

use crate::model::{AttendanceRecord, Expense, Fee, Payment, Student};

/// Mark bounds for a subject row: two continuous-assessment columns and an
/// exam, so a subject total reads as a percentage.
pub const CA_MAX: f64 = 20.0;
pub const EXAM_MAX: f64 = 60.0;

pub fn subject_total(ca1: f64, ca2: f64, exam: f64) -> f64 {
    round1(ca1 + ca2 + exam)
}

/// 1-decimal rounding used everywhere a derived figure is reported.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Fixed grade bands, inclusive at the lower bound.
pub fn grade_for(total: f64) -> (&'static str, &'static str) {
    if total >= 75.0 {
        ("A", "Excellent")
    } else if total >= 65.0 {
        ("B", "Very Good")
    } else if total >= 50.0 {
        ("C", "Good")
    } else if total >= 40.0 {
        ("D", "Pass")
    } else {
        ("F", "Fail")
    }
}

/// Head teacher remark derived from the overall grade band.
pub fn head_remark_for(grade: &str) -> &'static str {
    match grade {
        "A" => "An excellent result. Keep it up.",
        "B" => "A very good result. Aim higher.",
        "C" => "A good result. There is room for improvement.",
        "D" => "A fair result. More effort is needed.",
        _ => "A poor result. Serious improvement is required.",
    }
}

/// Ordinal position label: 1st, 2nd, 3rd, with the 11th..13th exceptions.
pub fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadsheetRow {
    pub student_id: String,
    pub display_name: String,
    pub admission_no: String,
    /// One slot per class subject, `None` where no score exists.
    pub totals: Vec<Option<f64>>,
    pub grand_total: f64,
    pub average: f64,
    pub grade: String,
    pub position: String,
}

/// Builds ranked broadsheet rows from per-student subject totals. The average
/// divides by the class subject count (a missing score counts 0) so every row
/// shares a denominator. The sort is stable: equal averages keep source order
/// and receive successive positions.
pub fn rank_broadsheet(
    entries: Vec<(String, String, String, Vec<Option<f64>>)>,
    subject_count: usize,
) -> Vec<BroadsheetRow> {
    let mut rows: Vec<BroadsheetRow> = entries
        .into_iter()
        .map(|(student_id, display_name, admission_no, totals)| {
            let grand_total: f64 = totals.iter().flatten().sum();
            let average = if subject_count > 0 {
                round1(grand_total / subject_count as f64)
            } else {
                0.0
            };
            let (grade, _) = grade_for(average);
            BroadsheetRow {
                student_id,
                display_name,
                admission_no,
                totals,
                grand_total: round1(grand_total),
                average,
                grade: grade.to_string(),
                position: String::new(),
            }
        })
        .collect();

    // Vec::sort_by is stable, so ties keep insertion order.
    rows.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));
    for (i, row) in rows.iter_mut().enumerate() {
        row.position = ordinal(i + 1);
    }
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub billed: f64,
    pub paid: f64,
    pub balance: f64,
}

/// Fee balance for one student in one session/term: billed minus paid.
/// A school-wide fee (no classId) bills every student; a class-scoped fee
/// bills only students in that class. Absent data is zero; the result does
/// not depend on row order.
pub fn student_balance(
    student: &Student,
    fees: &[Fee],
    payments: &[Payment],
    session: &str,
    term: &str,
) -> Balance {
    let billed: f64 = fees
        .iter()
        .filter(|f| f.session == session && f.term == term)
        .filter(|f| match &f.class_id {
            None => true,
            Some(cid) => student.class_id.as_deref() == Some(cid.as_str()),
        })
        .map(|f| f.amount)
        .sum();
    let paid: f64 = payments
        .iter()
        .filter(|p| p.student_id == student.id && p.session == session && p.term == term)
        .map(|p| p.amount)
        .sum();
    Balance {
        billed: round1(billed),
        paid: round1(paid),
        balance: round1(billed - paid),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodFinancials {
    pub collected: f64,
    pub expenses: f64,
    pub net: f64,
    /// Sum of positive balances over all students.
    pub outstanding: f64,
    pub debtor_count: usize,
}

pub fn period_financials(
    students: &[Student],
    fees: &[Fee],
    payments: &[Payment],
    expenses: &[Expense],
    session: &str,
    term: &str,
) -> PeriodFinancials {
    let collected: f64 = payments
        .iter()
        .filter(|p| p.session == session && p.term == term)
        .map(|p| p.amount)
        .sum();
    let spent: f64 = expenses
        .iter()
        .filter(|e| e.session == session && e.term == term)
        .map(|e| e.amount)
        .sum();

    let mut outstanding = 0.0;
    let mut debtor_count = 0;
    for student in students {
        let b = student_balance(student, fees, payments, session, term);
        if b.balance > 0.0 {
            outstanding += b.balance;
            debtor_count += 1;
        }
    }

    PeriodFinancials {
        collected: round1(collected),
        expenses: round1(spent),
        net: round1(collected - spent),
        outstanding: round1(outstanding),
        debtor_count,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTally {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    /// Registers saved for the class in the period, marked or not.
    pub days_recorded: usize,
}

pub fn attendance_tally(
    records: &[AttendanceRecord],
    class_id: &str,
    student_id: &str,
    session: &str,
    term: &str,
) -> AttendanceTally {
    let mut tally = AttendanceTally::default();
    for record in records
        .iter()
        .filter(|r| r.class_id == class_id && r.session == session && r.term == term)
    {
        tally.days_recorded += 1;
        for entry in record.entries.iter().filter(|e| e.student_id == student_id) {
            match entry.status.as_str() {
                "present" => tally.present += 1,
                "absent" => tally.absent += 1,
                "late" => tally.late += 1,
                _ => {}
            }
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttendanceEntry;

    fn fee(amount: f64, class_id: Option<&str>) -> Fee {
        Fee {
            id: "f".to_string(),
            name: "Tuition".to_string(),
            amount,
            class_id: class_id.map(|s| s.to_string()),
            session: "2025/2026".to_string(),
            term: "First Term".to_string(),
        }
    }

    fn payment(student_id: &str, amount: f64) -> Payment {
        Payment {
            id: "p".to_string(),
            student_id: student_id.to_string(),
            amount,
            session: "2025/2026".to_string(),
            term: "First Term".to_string(),
            ..Payment::default()
        }
    }

    fn student(id: &str, class_id: Option<&str>) -> Student {
        Student {
            id: id.to_string(),
            class_id: class_id.map(|s| s.to_string()),
            ..Student::default()
        }
    }

    #[test]
    fn grade_boundaries_are_inclusive_at_the_lower_bound() {
        assert_eq!(grade_for(75.0).0, "A");
        assert_eq!(grade_for(74.0).0, "B");
        assert_eq!(grade_for(65.0).0, "B");
        assert_eq!(grade_for(64.0).0, "C");
        assert_eq!(grade_for(50.0).0, "C");
        assert_eq!(grade_for(49.0).0, "D");
        assert_eq!(grade_for(40.0).0, "D");
        assert_eq!(grade_for(39.0).0, "F");
    }

    #[test]
    fn balance_is_zero_with_no_fees_and_no_payments() {
        let s = student("s1", Some("c1"));
        let b = student_balance(&s, &[], &[], "2025/2026", "First Term");
        assert_eq!(
            b,
            Balance {
                billed: 0.0,
                paid: 0.0,
                balance: 0.0
            }
        );
    }

    #[test]
    fn balance_is_billed_minus_paid_regardless_of_row_order() {
        let s = student("s1", Some("c1"));
        let fees = vec![
            fee(5000.0, None),
            fee(2000.0, Some("c1")),
            fee(999.0, Some("c2")),
        ];
        let pays = vec![
            payment("s1", 1500.0),
            payment("s2", 400.0),
            payment("s1", 500.0),
        ];
        let b = student_balance(&s, &fees, &pays, "2025/2026", "First Term");
        assert_eq!(b.billed, 7000.0);
        assert_eq!(b.paid, 2000.0);
        assert_eq!(b.balance, 5000.0);

        let mut fees_rev = fees.clone();
        fees_rev.reverse();
        let mut pays_rev = pays.clone();
        pays_rev.reverse();
        let b2 = student_balance(&s, &fees_rev, &pays_rev, "2025/2026", "First Term");
        assert_eq!(b, b2);
    }

    #[test]
    fn class_scoped_fee_skips_unassigned_students() {
        let s = student("s1", None);
        let fees = vec![fee(5000.0, None), fee(2000.0, Some("c1"))];
        let b = student_balance(&s, &fees, &[], "2025/2026", "First Term");
        assert_eq!(b.billed, 5000.0);
    }

    #[test]
    fn wrong_period_rows_do_not_count() {
        let s = student("s1", Some("c1"));
        let mut other_term = fee(5000.0, None);
        other_term.term = "Second Term".to_string();
        let b = student_balance(&s, &[other_term], &[], "2025/2026", "First Term");
        assert_eq!(b.billed, 0.0);
    }

    #[test]
    fn ordinal_handles_teens_and_twenties() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(22), "22nd");
        assert_eq!(ordinal(23), "23rd");
        assert_eq!(ordinal(111), "111th");
    }

    #[test]
    fn ranking_orders_by_average_descending() {
        let entries = vec![
            (
                "s1".to_string(),
                "A, A".to_string(),
                "001".to_string(),
                vec![Some(50.0), Some(60.0)],
            ),
            (
                "s2".to_string(),
                "B, B".to_string(),
                "002".to_string(),
                vec![Some(90.0), Some(80.0)],
            ),
            (
                "s3".to_string(),
                "C, C".to_string(),
                "003".to_string(),
                vec![Some(70.0), None],
            ),
        ];
        let rows = rank_broadsheet(entries, 2);
        assert_eq!(rows[0].student_id, "s2");
        assert_eq!(rows[0].position, "1st");
        assert_eq!(rows[0].average, 85.0);
        assert_eq!(rows[1].student_id, "s1");
        assert_eq!(rows[2].student_id, "s3");
        // Missing score counts zero against the shared denominator.
        assert_eq!(rows[2].average, 35.0);
    }

    #[test]
    fn ranking_ties_keep_source_order_with_successive_positions() {
        let entries = vec![
            (
                "s1".to_string(),
                "A, A".to_string(),
                "001".to_string(),
                vec![Some(60.0)],
            ),
            (
                "s2".to_string(),
                "B, B".to_string(),
                "002".to_string(),
                vec![Some(60.0)],
            ),
            (
                "s3".to_string(),
                "C, C".to_string(),
                "003".to_string(),
                vec![Some(60.0)],
            ),
        ];
        let rows = rank_broadsheet(entries, 1);
        let ids: Vec<&str> = rows.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
        let positions: Vec<&str> = rows.iter().map(|r| r.position.as_str()).collect();
        assert_eq!(positions, vec!["1st", "2nd", "3rd"]);
    }

    #[test]
    fn financials_sum_the_period_and_count_debtors() {
        let students = vec![student("s1", Some("c1")), student("s2", Some("c1"))];
        let fees = vec![fee(3000.0, None)];
        let pays = vec![payment("s1", 3000.0), payment("s2", 1000.0)];
        let expenses = vec![Expense {
            amount: 500.0,
            session: "2025/2026".to_string(),
            term: "First Term".to_string(),
            ..Expense::default()
        }];
        let f = period_financials(&students, &fees, &pays, &expenses, "2025/2026", "First Term");
        assert_eq!(f.collected, 4000.0);
        assert_eq!(f.expenses, 500.0);
        assert_eq!(f.net, 3500.0);
        assert_eq!(f.outstanding, 2000.0);
        assert_eq!(f.debtor_count, 1);
    }

    #[test]
    fn attendance_tally_counts_statuses_and_days() {
        let mut records = Vec::new();
        for (date, status) in [
            ("2025-09-01", "present"),
            ("2025-09-02", "late"),
            ("2025-09-03", "absent"),
        ] {
            records.push(AttendanceRecord {
                id: date.to_string(),
                class_id: "c1".to_string(),
                date: date.to_string(),
                session: "2025/2026".to_string(),
                term: "First Term".to_string(),
                entries: vec![AttendanceEntry {
                    student_id: "s1".to_string(),
                    status: status.to_string(),
                }],
            });
        }
        let t = attendance_tally(&records, "c1", "s1", "2025/2026", "First Term");
        assert_eq!(t.present, 1);
        assert_eq!(t.late, 1);
        assert_eq!(t.absent, 1);
        assert_eq!(t.days_recorded, 3);

        let none = attendance_tally(&records, "c1", "s2", "2025/2026", "First Term");
        assert_eq!(none.present, 0);
        assert_eq!(none.days_recorded, 3);
    }

    #[test]
    fn subject_total_rounds_to_one_decimal() {
        assert_eq!(subject_total(15.25, 14.25, 50.0), 79.5);
        assert_eq!(round1(35.68), 35.7);
        assert_eq!(round1(0.0), 0.0);
    }
}
