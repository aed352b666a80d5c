//! Attendance proration for a pay period.
//!
//! Working days are the days of the calendar month that the employee's
//! work-week policy treats as working. Each working day inside the employment
//! window earns the paid credit of its attendance record; a working day
//! without a record, or before joining or after exit, earns nothing.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::common::{non_negative, round_half_up};
use crate::models::{AttendanceRecord, Employee, PayPeriod};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProrationError {
    #[error("employee {employee_id} has no working days in {pay_period}")]
    NoWorkingDays {
        employee_id: i64,
        pay_period: PayPeriod,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proration {
    pub working_days: i64,
    pub paid_days: Decimal,
    pub lwp_days: Decimal,
    /// Loss-of-pay amount taken off the monthly gross.
    pub lwp_deduction: Decimal,
}

impl Proration {
    /// Scales a monthly amount by `paid_days / working_days`.
    pub fn earned(
        &self,
        monthly_amount: Decimal,
        scale: u32,
    ) -> Decimal {
        round_half_up(
            monthly_amount * self.paid_days / Decimal::from(self.working_days),
            scale,
        )
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceProrator<'a> {
    employee: &'a Employee,
    pay_period: PayPeriod,
    scale: u32,
}

impl<'a> AttendanceProrator<'a> {
    pub fn new(
        employee: &'a Employee,
        pay_period: PayPeriod,
        scale: u32,
    ) -> Self {
        Self {
            employee,
            pay_period,
            scale,
        }
    }

    /// Prorates `gross_monthly` against the employee's attendance.
    ///
    /// Records outside the period, for non-working days or for other
    /// employees are ignored. When a date has more than one record the last
    /// one wins.
    ///
    /// # Errors
    ///
    /// [`ProrationError::NoWorkingDays`] when no working day of the period
    /// falls inside the employment window.
    pub fn prorate(
        &self,
        records: &[AttendanceRecord],
        gross_monthly: Decimal,
    ) -> Result<Proration, ProrationError> {
        let working = self.working_dates();
        if !working.iter().any(|d| self.employee.is_employed_on(*d)) {
            return Err(ProrationError::NoWorkingDays {
                employee_id: self.employee.id,
                pay_period: self.pay_period,
            });
        }

        let working_days = working.len() as i64;
        let paid_days = self.paid_days(&working, records).min(Decimal::from(working_days));
        let lwp_days = non_negative(Decimal::from(working_days) - paid_days);
        let lwp_deduction = self.lwp_deduction(gross_monthly, lwp_days, working_days);

        tracing::debug!(
            employee_id = self.employee.id,
            pay_period = %self.pay_period,
            working_days,
            %paid_days,
            %lwp_days,
            %lwp_deduction,
            "prorated attendance"
        );

        Ok(Proration {
            working_days,
            paid_days,
            lwp_days,
            lwp_deduction,
        })
    }

    fn working_dates(&self) -> Vec<NaiveDate> {
        self.pay_period
            .first_day()
            .iter_days()
            .take_while(|d| *d <= self.pay_period.last_day())
            .filter(|d| self.employee.work_week.is_working_day(*d))
            .collect()
    }

    fn paid_days(
        &self,
        working: &[NaiveDate],
        records: &[AttendanceRecord],
    ) -> Decimal {
        let by_date: HashMap<NaiveDate, Decimal> = records
            .iter()
            .filter(|r| r.employee_id == self.employee.id)
            .map(|r| (r.date, r.status.paid_credit()))
            .collect();

        working
            .iter()
            .filter(|d| self.employee.is_employed_on(**d))
            .filter_map(|d| by_date.get(d))
            .copied()
            .sum()
    }

    fn lwp_deduction(
        &self,
        gross_monthly: Decimal,
        lwp_days: Decimal,
        working_days: i64,
    ) -> Decimal {
        if lwp_days.is_zero() {
            return Decimal::ZERO;
        }
        round_half_up(
            gross_monthly * lwp_days / Decimal::from(working_days),
            self.scale,
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::{AttendanceStatus, WorkWeekPolicy};

    fn date(
        y: i32,
        m: u32,
        d: u32,
    ) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn employee(work_week: WorkWeekPolicy) -> Employee {
        Employee {
            id: 1,
            organization_id: 1,
            full_name: "Ravi Menon".to_string(),
            department: Some("Engineering".to_string()),
            job_title: None,
            work_week,
            join_date: date(2020, 1, 1),
            exit_date: None,
            tax_regime: None,
            is_active: true,
        }
    }

    fn period(
        y: i32,
        m: u32,
    ) -> PayPeriod {
        PayPeriod::new(y, m).unwrap()
    }

    /// Marks every working day of the period with `status`, except `skip`.
    fn attendance(
        employee: &Employee,
        pay_period: PayPeriod,
        status: AttendanceStatus,
        skip: &[NaiveDate],
    ) -> Vec<AttendanceRecord> {
        pay_period
            .first_day()
            .iter_days()
            .take_while(|d| *d <= pay_period.last_day())
            .filter(|d| employee.work_week.is_working_day(*d))
            .filter(|d| !skip.contains(d))
            .map(|date| AttendanceRecord {
                employee_id: employee.id,
                date,
                status,
            })
            .collect()
    }

    // =========================================================================
    // working day tests
    // =========================================================================

    #[test]
    fn five_day_week_counts_weekdays() {
        // July 2025 has 23 weekdays.
        let emp = employee(WorkWeekPolicy::FiveDay);
        let records = attendance(&emp, period(2025, 7), AttendanceStatus::Present, &[]);

        let result = AttendanceProrator::new(&emp, period(2025, 7), 0)
            .prorate(&records, dec!(100000))
            .unwrap();

        assert_eq!(result.working_days, 23);
        assert_eq!(result.paid_days, dec!(23));
        assert_eq!(result.lwp_days, dec!(0));
        assert_eq!(result.lwp_deduction, dec!(0));
    }

    #[test]
    fn six_day_week_counts_saturdays() {
        // July 2025: 23 weekdays plus 4 Saturdays.
        let emp = employee(WorkWeekPolicy::SixDay);

        let result = AttendanceProrator::new(&emp, period(2025, 7), 0)
            .prorate(&[], dec!(100000))
            .unwrap();

        assert_eq!(result.working_days, 27);
    }

    #[test]
    fn mid_month_joiner_is_unpaid_before_joining() {
        let mut emp = employee(WorkWeekPolicy::FiveDay);
        emp.join_date = date(2025, 7, 30);
        let records = attendance(&emp, period(2025, 7), AttendanceStatus::Present, &[]);

        let result = AttendanceProrator::new(&emp, period(2025, 7), 0)
            .prorate(&records, dec!(100000))
            .unwrap();

        // Present on the 30th and 31st only; records before joining earn nothing.
        assert_eq!(result.working_days, 23);
        assert_eq!(result.paid_days, dec!(2));
        assert_eq!(result.lwp_days, dec!(21));
        assert_eq!(result.lwp_deduction, dec!(91304));
    }

    #[test]
    fn mid_month_leaver_is_unpaid_after_exit() {
        let mut emp = employee(WorkWeekPolicy::FiveDay);
        emp.exit_date = Some(date(2025, 9, 12));
        let records = attendance(&emp, period(2025, 9), AttendanceStatus::Present, &[]);

        let result = AttendanceProrator::new(&emp, period(2025, 9), 0)
            .prorate(&records, dec!(44000))
            .unwrap();

        // 1st to 12th September 2025: 10 weekdays out of 22.
        assert_eq!(result.working_days, 22);
        assert_eq!(result.paid_days, dec!(10));
        assert_eq!(result.lwp_deduction, dec!(24000));
    }

    #[test]
    fn exit_before_period_has_no_working_days() {
        let mut emp = employee(WorkWeekPolicy::FiveDay);
        emp.exit_date = Some(date(2025, 6, 30));

        let result = AttendanceProrator::new(&emp, period(2025, 7), 0).prorate(&[], dec!(100000));

        assert_eq!(
            result,
            Err(ProrationError::NoWorkingDays {
                employee_id: 1,
                pay_period: period(2025, 7)
            })
        );
    }

    // =========================================================================
    // loss-of-pay tests
    // =========================================================================

    #[test]
    fn two_absences_in_twenty_two_day_month() {
        // June 2025 has 21 weekdays under a five-day week; September 2025 has 22.
        let emp = employee(WorkWeekPolicy::FiveDay);
        let absent = [date(2025, 9, 10), date(2025, 9, 11)];
        let records = attendance(&emp, period(2025, 9), AttendanceStatus::Present, &absent);

        let result = AttendanceProrator::new(&emp, period(2025, 9), 0)
            .prorate(&records, dec!(100000))
            .unwrap();

        assert_eq!(result.working_days, 22);
        assert_eq!(result.paid_days, dec!(20));
        assert_eq!(result.lwp_days, dec!(2));
        assert_eq!(result.lwp_deduction, dec!(9091));
    }

    #[test]
    fn half_days_earn_half_credit() {
        let emp = employee(WorkWeekPolicy::FiveDay);
        let mut records = attendance(&emp, period(2025, 9), AttendanceStatus::Present, &[]);
        records[0].status = AttendanceStatus::HalfDay;
        records[1].status = AttendanceStatus::Absent;

        let result = AttendanceProrator::new(&emp, period(2025, 9), 2)
            .prorate(&records, dec!(44000))
            .unwrap();

        assert_eq!(result.paid_days, dec!(20.5));
        assert_eq!(result.lwp_days, dec!(1.5));
        assert_eq!(result.lwp_deduction, dec!(3000.00));
    }

    #[test]
    fn leave_and_holidays_are_paid() {
        let emp = employee(WorkWeekPolicy::FiveDay);
        let mut records = attendance(&emp, period(2025, 9), AttendanceStatus::Present, &[]);
        records[0].status = AttendanceStatus::ApprovedLeave;
        records[1].status = AttendanceStatus::Holiday;

        let result = AttendanceProrator::new(&emp, period(2025, 9), 0)
            .prorate(&records, dec!(100000))
            .unwrap();

        assert_eq!(result.lwp_days, dec!(0));
    }

    #[test]
    fn missing_records_are_unpaid() {
        let emp = employee(WorkWeekPolicy::FiveDay);

        let result = AttendanceProrator::new(&emp, period(2025, 9), 0)
            .prorate(&[], dec!(100000))
            .unwrap();

        assert_eq!(result.paid_days, dec!(0));
        assert_eq!(result.lwp_days, dec!(22));
        assert_eq!(result.lwp_deduction, dec!(100000));
    }

    #[test]
    fn weekend_records_do_not_add_credit() {
        let emp = employee(WorkWeekPolicy::FiveDay);
        let mut records = attendance(&emp, period(2025, 9), AttendanceStatus::Present, &[]);
        records.push(AttendanceRecord {
            employee_id: 1,
            date: date(2025, 9, 6),
            status: AttendanceStatus::Present,
        });

        let result = AttendanceProrator::new(&emp, period(2025, 9), 0)
            .prorate(&records, dec!(100000))
            .unwrap();

        assert_eq!(result.paid_days, dec!(22));
    }

    #[test]
    fn earned_scales_by_paid_fraction() {
        let proration = Proration {
            working_days: 22,
            paid_days: dec!(20),
            lwp_days: dec!(2),
            lwp_deduction: dec!(9091),
        };

        assert_eq!(proration.earned(dec!(40000), 0), dec!(36364));
    }
}
