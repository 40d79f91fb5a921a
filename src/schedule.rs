use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single on-call shift within a [`TemporarySchedule`]. Intervals are
/// start-inclusive, end-exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shift {
    pub user_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Shift {
    fn covers(&self, t: DateTime<Utc>) -> bool {
        !(t < self.start) && t < self.end
    }
}

/// A temporary override of the regular rotation for `[start, end)`. The data
/// is expected to arrive pre-merged and sorted: only one temporary schedule
/// can be active at a given instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemporarySchedule {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub shifts: Vec<Shift>,
}

impl TemporarySchedule {
    fn covers(&self, t: DateTime<Utc>) -> bool {
        !(t < self.start) && t < self.end
    }
}

/// `channel_id`/`weekday`/`clock_time` entry. Up to ten per schedule;
/// `weekday` is `0..=6` (Sunday = 0, matching `time.Weekday`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnCallNotification {
    pub channel_id: Uuid,
    pub weekday: u8,
    pub clock_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScheduleDataV1 {
    #[serde(default)]
    pub temporary_schedules: Vec<TemporarySchedule>,
    #[serde(default)]
    pub on_call_notifications: Vec<OnCallNotification>,
}

/// Round-trips through the `schedules.data` jsonb column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScheduleData {
    #[serde(default)]
    pub v1: ScheduleDataV1,
}

impl ScheduleData {
    /// Returns `(is_active, users_on_shift)` for time `t`, mirroring
    /// `schedule/data.go`'s `TempOnCall`: stops at the first matching
    /// temporary schedule and collects the shifts covering `t` within it.
    pub fn temp_on_call(&self, t: DateTime<Utc>) -> (bool, Vec<Uuid>) {
        for temp in &self.v1.temporary_schedules {
            if !temp.covers(t) {
                continue;
            }
            let users = temp
                .shifts
                .iter()
                .filter(|shift| shift.covers(t))
                .map(|shift| shift.user_id)
                .collect();
            return (true, users);
        }
        (false, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn no_temporary_schedules_is_inactive() {
        let data = ScheduleData::default();
        assert_eq!(data.temp_on_call(at(12)), (false, Vec::new()));
    }

    #[test]
    fn active_temporary_schedule_collects_covering_shifts() {
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let data = ScheduleData {
            v1: ScheduleDataV1 {
                temporary_schedules: vec![TemporarySchedule {
                    start: at(0),
                    end: at(23),
                    shifts: vec![
                        Shift {
                            user_id: user_a,
                            start: at(0),
                            end: at(12),
                        },
                        Shift {
                            user_id: user_b,
                            start: at(12),
                            end: at(23),
                        },
                    ],
                }],
                on_call_notifications: Vec::new(),
            },
        };

        let (active, users) = data.temp_on_call(at(6));
        assert!(active);
        assert_eq!(users, vec![user_a]);

        let (active, users) = data.temp_on_call(at(12));
        assert!(active);
        assert_eq!(users, vec![user_b]);
    }

    #[test]
    fn interval_is_start_inclusive_end_exclusive() {
        let user_a = Uuid::new_v4();
        let data = ScheduleData {
            v1: ScheduleDataV1 {
                temporary_schedules: vec![TemporarySchedule {
                    start: at(0),
                    end: at(12),
                    shifts: vec![Shift {
                        user_id: user_a,
                        start: at(0),
                        end: at(12),
                    }],
                }],
                on_call_notifications: Vec::new(),
            },
        };
        assert!(data.temp_on_call(at(12)).0 == false);
        assert!(data.temp_on_call(at(0)).1 == vec![user_a]);
    }

    #[test]
    fn only_first_matching_temporary_schedule_is_used() {
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let data = ScheduleData {
            v1: ScheduleDataV1 {
                temporary_schedules: vec![
                    TemporarySchedule {
                        start: at(0),
                        end: at(23),
                        shifts: vec![Shift {
                            user_id: user_a,
                            start: at(0),
                            end: at(23),
                        }],
                    },
                    TemporarySchedule {
                        start: at(0),
                        end: at(23),
                        shifts: vec![Shift {
                            user_id: user_b,
                            start: at(0),
                            end: at(23),
                        }],
                    },
                ],
                on_call_notifications: Vec::new(),
            },
        };
        assert_eq!(data.temp_on_call(at(6)).1, vec![user_a]);
    }
}
