use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::models::{Member, MemberStatus};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpcomingBirthday {
    pub member_id: String,
    pub child_name: String,
    pub parent_name: String,
    pub birthdate: NaiveDate,
    pub next_birthday: NaiveDate,
    pub days_remaining: i64,
    /// Age the child turns on `next_birthday`.
    pub turning: i32,
}

/// Accepts `YYYY-MM-DD` and `DD/MM/YYYY` (single-digit day/month allowed).
pub fn parse_birthdate(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Timestamps like "2015-05-18T00:00:00" keep only the date part.
    let raw = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

/// The birthday in `year`; Feb 29 lands on Mar 1 outside leap years.
fn birthday_in(birthdate: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, birthdate.month(), birthdate.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
}

/// This year's birthday, or next year's if it already passed.
pub fn next_birthday(birthdate: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    let this_year = birthday_in(birthdate, today.year())?;
    if this_year < today {
        birthday_in(birthdate, today.year() + 1)
    } else {
        Some(this_year)
    }
}

pub fn upcoming_birthdays(
    members: &[Member],
    today: NaiveDate,
    window_days: i64,
) -> Vec<UpcomingBirthday> {
    let mut upcoming: Vec<UpcomingBirthday> = members
        .iter()
        .filter(|m| m.status == MemberStatus::Active)
        .filter_map(|member| {
            let Some(birthdate) = parse_birthdate(&member.child_birthdate) else {
                tracing::warn!(
                    member_id = %member.id,
                    birthdate = %member.child_birthdate,
                    "skipping member with unparseable birthdate"
                );
                return None;
            };
            let next = next_birthday(birthdate, today)?;
            let days_remaining = (next - today).num_days();
            (0..=window_days).contains(&days_remaining).then(|| UpcomingBirthday {
                member_id: member.id.clone(),
                child_name: member.child_name.clone(),
                parent_name: member.parent_name.clone(),
                birthdate,
                next_birthday: next,
                days_remaining,
                turning: next.year() - birthdate.year(),
            })
        })
        .collect();

    upcoming.sort_by(|a, b| {
        a.days_remaining
            .cmp(&b.days_remaining)
            .then_with(|| a.child_name.cmp(&b.child_name))
    });
    upcoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(id: &str, child: &str, birthdate: &str) -> Member {
        Member {
            id: id.into(),
            community_id: "c1".into(),
            parent_name: format!("parent of {child}"),
            parent_email: None,
            parent_whatsapp: None,
            payment_alias: None,
            child_name: child.into(),
            child_birthdate: birthdate.into(),
            status: MemberStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepts_iso_and_slash_formats() {
        assert_eq!(parse_birthdate("2017-05-18"), Some(date(2017, 5, 18)));
        assert_eq!(parse_birthdate("18/05/2017"), Some(date(2017, 5, 18)));
        assert_eq!(parse_birthdate("8/5/2017"), Some(date(2017, 5, 8)));
        assert_eq!(parse_birthdate("2017-05-18T00:00:00.000Z"), Some(date(2017, 5, 18)));
        assert_eq!(parse_birthdate("31/02/2017"), None);
        assert_eq!(parse_birthdate("mayo"), None);
    }

    #[test]
    fn birthday_eight_days_out_is_included() {
        let members = [member("m1", "Lola", "2018-05-18")];
        let result = upcoming_birthdays(&members, date(2026, 5, 10), 15);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].days_remaining, 8);
        assert_eq!(result[0].next_birthday, date(2026, 5, 18));
        assert_eq!(result[0].turning, 8);
    }

    #[test]
    fn passed_birthday_rolls_to_next_year_and_falls_outside_window() {
        let birthdate = date(2018, 5, 18);
        let today = date(2026, 5, 19);
        let next = next_birthday(birthdate, today).unwrap();
        assert_eq!(next, date(2027, 5, 18));
        assert_eq!((next - today).num_days(), 364);

        let members = [member("m1", "Lola", "18/05/2018")];
        assert!(upcoming_birthdays(&members, today, 15).is_empty());
    }

    #[test]
    fn birthday_today_counts_as_zero_days() {
        let members = [member("m1", "Lola", "2018-05-18")];
        let result = upcoming_birthdays(&members, date(2026, 5, 18), 15);
        assert_eq!(result[0].days_remaining, 0);
    }

    #[test]
    fn window_edge_is_inclusive_and_results_are_sorted() {
        let members = [
            member("m1", "Tomas", "2019-06-15"),
            member("m2", "Ana", "2019-06-01"),
            member("m3", "Bruno", "2019-06-16"),
            member("m4", "Broken", "not a date"),
        ];
        let result = upcoming_birthdays(&members, date(2026, 5, 31), 15);
        let ids: Vec<_> = result.iter().map(|u| u.member_id.as_str()).collect();
        assert_eq!(ids, ["m2", "m1"]);
        assert_eq!(result[1].days_remaining, 15);
    }

    #[test]
    fn leap_day_birthdays_use_march_first_in_common_years() {
        assert_eq!(next_birthday(date(2016, 2, 29), date(2026, 2, 20)), Some(date(2026, 3, 1)));
        assert_eq!(next_birthday(date(2016, 2, 29), date(2028, 2, 20)), Some(date(2028, 2, 29)));
    }

    #[test]
    fn year_end_wraps_around() {
        let members = [member("m1", "Noel", "2020-01-03")];
        let result = upcoming_birthdays(&members, date(2026, 12, 28), 15);
        assert_eq!(result[0].days_remaining, 6);
        assert_eq!(result[0].next_birthday, date(2027, 1, 3));
    }

    #[test]
    fn inactive_members_are_ignored() {
        let mut m = member("m1", "Lola", "2018-05-18");
        m.status = MemberStatus::Inactive;
        assert!(upcoming_birthdays(&[m], date(2026, 5, 10), 15).is_empty());
    }
}
