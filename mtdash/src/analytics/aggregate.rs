//! Aggregations over decoded rows.
//!
//! Everything here is synchronous and deterministic: the reference instant is passed in, so the
//! same rows always produce the same panel.

use super::models::{DEFAULT_TIER, Profile, Trip};
use crate::api::models::growth::{DailySignups, GrowthSet, PeriodGrowth, Trend};
use crate::api::models::overview::{Alert, AlertSeverity, EngagementMetrics};
use crate::api::models::retention::{
    ActivationBucket, ActivationSummary, CohortRetention, RetentionPoint, RetentionReport, WeeklyCohort,
};
use crate::api::models::revenue::{RevenueReport, TierBreakdown};
use crate::api::models::trips::{ActivityEntry, HourCount, MonthlyTrend, TripSummary, UsagePatterns, WeekdayCount};
use crate::api::models::users::{AtRiskReport, Segment, SegmentCount, SegmentReport, UserSegment, UserTripStats};
use crate::types::ProfileId;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const RETENTION_DAYS: [u32; 3] = [1, 7, 30];
pub const GROWTH_PERIODS: [u32; 3] = [7, 30, 90];
pub const SIGNUP_HISTORY_DAYS: u32 = 30;
pub const COHORT_WEEKS: usize = 12;
pub const UNKNOWN_USER: &str = "Unknown User";

const WEEKDAYS: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

fn window_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now - TimeDelta::days(i64::from(days))
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 { 0.0 } else { round2(part as f64 / whole as f64 * 100.0) }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn trips_since(trips: &[Trip], start: DateTime<Utc>) -> impl Iterator<Item = &Trip> {
    trips.iter().filter(move |t| t.activity_at().is_some_and(|at| at >= start))
}

fn active_since(trips: &[Trip], start: DateTime<Utc>) -> HashSet<ProfileId> {
    trips_since(trips, start).map(|t| t.user_id).collect()
}

/// Distinct trip owners with a trip in the trailing window.
pub fn active_user_count(trips: &[Trip], now: DateTime<Utc>, days: u32) -> u64 {
    active_since(trips, window_start(now, days)).len() as u64
}

/// Distinct trip owners with a trip since midnight UTC.
pub fn active_today(trips: &[Trip], now: DateTime<Utc>) -> u64 {
    active_since(trips, start_of_day(now)).len() as u64
}

/// Per-profile aggregates, one entry per profile in input order.
///
/// Trips whose owner is not among `profiles` are not counted.
pub fn user_stats(profiles: &[Profile], trips: &[Trip], now: DateTime<Utc>) -> Vec<UserTripStats> {
    let mut by_user: HashMap<ProfileId, Vec<&Trip>> = HashMap::new();
    for trip in trips {
        by_user.entry(trip.user_id).or_default().push(trip);
    }

    profiles
        .iter()
        .map(|profile| {
            let owned = by_user.get(&profile.id).map(Vec::as_slice).unwrap_or_default();
            stats_for(profile, owned, now)
        })
        .collect()
}

fn stats_for(profile: &Profile, trips: &[&Trip], now: DateTime<Utc>) -> UserTripStats {
    let trip_count = trips.len() as u64;
    let distances: Vec<f64> = trips.iter().filter_map(|t| t.effective_distance()).collect();
    let durations: Vec<f64> = trips.iter().filter_map(|t| t.duration_minutes()).collect();
    let first_trip_at = trips.iter().filter_map(|t| t.activity_at()).min();
    let last_trip_at = trips.iter().filter_map(|t| t.activity_at()).max();

    let trips_per_week = first_trip_at.map_or(0.0, |first| {
        let weeks = ((now - first).num_days() / 7).max(1);
        round2(trip_count as f64 / weeks as f64)
    });

    UserTripStats {
        user_id: profile.id,
        full_name: profile.full_name.clone(),
        subscription_tier: profile.tier(),
        registered_at: profile.created_at,
        trip_count,
        total_distance: distances.iter().sum(),
        average_distance: mean(&distances),
        total_fuel_used: trips.iter().filter_map(|t| t.fuel_used).sum(),
        total_reimbursement: trips.iter().filter_map(|t| t.reimbursement).sum(),
        total_duration_minutes: durations.iter().sum(),
        average_duration_minutes: mean(&durations),
        first_trip_at,
        last_trip_at,
        days_since_last_trip: last_trip_at.map(|last| (now - last).num_days()),
        trips_per_week,
    }
}

/// Most active users by trip count, ties broken by distance.
pub fn top_users(mut stats: Vec<UserTripStats>, limit: usize, include_inactive: bool) -> Vec<UserTripStats> {
    if !include_inactive {
        stats.retain(|s| s.trip_count > 0);
    }
    stats.sort_by(|a, b| {
        b.trip_count
            .cmp(&a.trip_count)
            .then_with(|| b.total_distance.total_cmp(&a.total_distance))
    });
    stats.truncate(limit);
    stats
}

pub fn trip_summary(trips: &[Trip], now: DateTime<Utc>) -> TripSummary {
    let distances: Vec<f64> = trips.iter().filter_map(Trip::effective_distance).collect();
    let durations: Vec<f64> = trips.iter().filter_map(Trip::duration_minutes).collect();
    let speeds: Vec<f64> = trips.iter().filter_map(Trip::average_speed_mph).collect();

    TripSummary {
        total_trips: trips.len() as u64,
        total_distance: distances.iter().sum(),
        average_distance: mean(&distances),
        average_duration_minutes: mean(&durations),
        average_speed_mph: mean(&speeds),
        total_fuel_used: trips.iter().filter_map(|t| t.fuel_used).sum(),
        total_reimbursement: trips.iter().filter_map(|t| t.reimbursement).sum(),
        trips_today: trips_since(trips, start_of_day(now)).count() as u64,
        trips_last_7_days: trips_since(trips, window_start(now, 7)).count() as u64,
        trips_last_30_days: trips_since(trips, window_start(now, 30)).count() as u64,
    }
}

fn is_inactive(stats: &UserTripStats, inactivity_days: u32) -> bool {
    stats.days_since_last_trip.is_some_and(|days| days > i64::from(inactivity_days))
}

/// Users whose last trip is older than `inactivity_days`, longest inactive first.
pub fn users_at_risk(stats: &[UserTripStats], inactivity_days: u32) -> AtRiskReport {
    let mut users: Vec<UserTripStats> = stats.iter().filter(|s| is_inactive(s, inactivity_days)).cloned().collect();
    users.sort_by(|a, b| {
        b.days_since_last_trip
            .cmp(&a.days_since_last_trip)
            .then_with(|| b.trip_count.cmp(&a.trip_count))
    });

    AtRiskReport {
        inactivity_days,
        users,
        never_used_count: stats.iter().filter(|s| s.trip_count == 0).count() as u64,
    }
}

pub fn segment_for(trip_count: u64, days_inactive: i64) -> Segment {
    match (trip_count, days_inactive) {
        (_, d) if d > 30 => Segment::Churned,
        (_, d) if d > 14 => Segment::AtRisk,
        (n, d) if n >= 20 && d <= 7 => Segment::PowerUser,
        (n, _) if n >= 10 => Segment::Regular,
        (n, _) if n >= 5 => Segment::Casual,
        _ => Segment::New,
    }
}

/// Segment every user with at least one dated trip, highest activity score first.
pub fn segments(stats: &[UserTripStats]) -> SegmentReport {
    let active: Vec<(&UserTripStats, i64)> = stats
        .iter()
        .filter(|s| s.trip_count > 0)
        .filter_map(|s| s.days_since_last_trip.map(|days| (s, days.max(0))))
        .collect();
    let max_distance = active.iter().map(|(s, _)| s.total_distance).fold(0.0, f64::max);

    let mut users: Vec<UserSegment> = active
        .iter()
        .map(|(s, days)| {
            let distance_score = if max_distance > 0.0 { s.total_distance / max_distance * 100.0 } else { 0.0 };
            let recency_score = (100 - (*days).min(100)) as f64;
            UserSegment {
                user_id: s.user_id,
                full_name: s.full_name.clone(),
                segment: segment_for(s.trip_count, *days),
                trip_count: s.trip_count,
                days_inactive: *days,
                activity_score: round2(s.trip_count as f64 * 0.4 + distance_score * 0.3 + recency_score * 0.3),
            }
        })
        .collect();
    users.sort_by(|a, b| b.activity_score.total_cmp(&a.activity_score));

    let counts = Segment::ALL
        .iter()
        .map(|segment| SegmentCount {
            segment: *segment,
            users: users.iter().filter(|u| u.segment == *segment).count() as u64,
        })
        .collect();

    SegmentReport { counts, users }
}

/// (current - previous) / previous, or `None` when there is no previous activity to compare with.
pub fn growth_delta(current: u64, previous: u64) -> Option<f64> {
    (previous > 0).then(|| (current as f64 - previous as f64) / previous as f64)
}

/// Activity of the last 30 days, with the owners whose latest trip is older than `inactivity_days`.
pub fn engagement(trips: &[Trip], now: DateTime<Utc>, inactivity_days: u32) -> EngagementMetrics {
    let week_ago = window_start(now, 7);
    let active_7d = active_since(trips, week_ago);
    let active_30d = active_since(trips, window_start(now, 30));
    let cooling = active_30d.difference(&active_7d).count() as u64;

    let this_week = trips_since(trips, week_ago).count() as u64;
    let last_week = trips
        .iter()
        .filter_map(Trip::activity_at)
        .filter(|at| *at >= window_start(now, 14) && *at < week_ago)
        .count() as u64;
    let weekly_trip_trend = growth_delta(this_week, last_week).map(|d| round2(d * 100.0));

    let trips_30d = trips_since(trips, window_start(now, 30)).count();
    let engagement_score = if active_30d.is_empty() {
        0.0
    } else {
        round2((trips_30d as f64 / active_30d.len() as f64 * 10.0).min(100.0))
    };
    let predicted = active_7d.len() as f64 * (1.0 + weekly_trip_trend.unwrap_or(0.0) / 100.0);

    EngagementMetrics {
        active_users_7d: active_7d.len() as u64,
        active_users_30d: active_30d.len() as u64,
        churn_risk_rate: percent(cooling, active_30d.len() as u64),
        users_at_risk: inactive_owners(trips, window_start(now, inactivity_days)),
        weekly_trip_trend,
        engagement_score,
        predicted_active_next_week: predicted.round().max(0.0) as u64,
    }
}

fn inactive_owners(trips: &[Trip], cutoff: DateTime<Utc>) -> u64 {
    let mut latest: HashMap<ProfileId, DateTime<Utc>> = HashMap::new();
    for trip in trips {
        if let Some(at) = trip.activity_at() {
            latest.entry(trip.user_id).and_modify(|l| *l = (*l).max(at)).or_insert(at);
        }
    }
    latest.values().filter(|at| **at < cutoff).count() as u64
}

fn alert(code: &str, severity: AlertSeverity, message: String) -> Alert {
    Alert {
        code: code.to_string(),
        severity,
        message,
    }
}

/// Conditions worth surfacing on the landing view. Unknown inputs raise nothing.
pub fn alerts(total_users: Option<u64>, engagement: Option<&EngagementMetrics>) -> Vec<Alert> {
    if total_users == Some(0) {
        return vec![alert("no_users", AlertSeverity::Critical, "No registered users found".to_string())];
    }
    let Some(engagement) = engagement else {
        return Vec::new();
    };

    let mut alerts = Vec::new();
    if engagement.engagement_score < 20.0 {
        alerts.push(alert(
            "low_engagement",
            AlertSeverity::Warning,
            format!("Engagement score is low ({:.1})", engagement.engagement_score),
        ));
    }
    if engagement.churn_risk_rate > 30.0 {
        alerts.push(alert(
            "high_churn_risk",
            AlertSeverity::Warning,
            format!("{:.1}% of monthly active users have not travelled this week", engagement.churn_risk_rate),
        ));
    }
    if let Some(trend) = engagement.weekly_trip_trend
        && trend < -10.0
    {
        alerts.push(alert(
            "declining_activity",
            AlertSeverity::Warning,
            format!("Trips are down {:.1}% week over week", trend.abs()),
        ));
    }
    alerts
}

fn busiest(counts: &[u64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, count) in counts.iter().enumerate() {
        if *count > 0 && best.is_none_or(|b| *count > counts[b]) {
            best = Some(i);
        }
    }
    best
}

/// Trips in the window by hour of day and weekday, using the start time when known.
pub fn usage_patterns(trips: &[Trip], now: DateTime<Utc>, days: u32) -> UsagePatterns {
    let mut heatmap = vec![vec![0u64; 24]; 7];
    for trip in trips_since(trips, window_start(now, days)) {
        if let Some(at) = trip.started_at().or(trip.activity_at()) {
            heatmap[at.weekday().num_days_from_monday() as usize][at.hour() as usize] += 1;
        }
    }

    let hours: Vec<u64> = (0..24).map(|h| heatmap.iter().map(|row| row[h]).sum()).collect();
    let weekdays: Vec<u64> = heatmap.iter().map(|row| row.iter().sum()).collect();

    UsagePatterns {
        window_days: days,
        by_hour: hours
            .iter()
            .enumerate()
            .map(|(hour, trips)| HourCount {
                hour: hour as u32,
                trips: *trips,
            })
            .collect(),
        by_weekday: weekdays
            .iter()
            .zip(WEEKDAYS)
            .map(|(trips, weekday)| WeekdayCount {
                weekday: weekday.to_string(),
                trips: *trips,
            })
            .collect(),
        busiest_hour: busiest(&hours).map(|h| h as u32),
        busiest_weekday: busiest(&weekdays).map(|d| WEEKDAYS[d].to_string()),
        heatmap,
        monthly_trend: monthly_trend(trips),
    }
}

/// Trips, distance and distinct users per calendar month, oldest first, over every trip.
pub fn monthly_trend(trips: &[Trip]) -> Vec<MonthlyTrend> {
    let mut months: BTreeMap<(i32, u32), (u64, f64, HashSet<ProfileId>)> = BTreeMap::new();
    for trip in trips {
        let Some(at) = trip.activity_at() else { continue };
        let (count, distance, users) = months.entry((at.year(), at.month())).or_default();
        *count += 1;
        *distance += trip.effective_distance().unwrap_or(0.0);
        users.insert(trip.user_id);
    }

    months
        .into_iter()
        .map(|((year, month), (trips, distance, users))| MonthlyTrend {
            month: format!("{year:04}-{month:02}"),
            trips,
            total_distance: round2(distance),
            unique_users: users.len() as u64,
        })
        .collect()
}

/// Compare `[now - days, now]` against the `days` before it.
pub fn period_growth(instants: &[DateTime<Utc>], now: DateTime<Utc>, days: u32) -> PeriodGrowth {
    let start = window_start(now, days);
    let previous_start = window_start(now, days * 2);
    let current = instants.iter().filter(|at| **at >= start && **at <= now).count() as u64;
    let previous = instants.iter().filter(|at| **at >= previous_start && **at < start).count() as u64;
    let delta = growth_delta(current, previous);

    let trend = match delta {
        Some(d) if d > 0.0 => Trend::Up,
        Some(d) if d < 0.0 => Trend::Down,
        None if current > 0 => Trend::Up,
        _ => Trend::Stable,
    };

    PeriodGrowth {
        period_days: days,
        current,
        previous,
        delta,
        trend,
    }
}

pub fn growth_set(instants: &[DateTime<Utc>], now: DateTime<Utc>) -> GrowthSet {
    let [week, month, quarter] = GROWTH_PERIODS.map(|days| period_growth(instants, now, days));
    GrowthSet {
        week_over_week: week,
        month_over_month: month,
        quarter_over_quarter: quarter,
    }
}

/// Registrations per day for the last `days` days, ending today.
pub fn daily_signups(profiles: &[Profile], now: DateTime<Utc>, days: u32) -> Vec<DailySignups> {
    let today = now.date_naive();
    let first = today - TimeDelta::days(i64::from(days.max(1)) - 1);

    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for day in profiles.iter().filter_map(|p| p.created_at).map(|at| at.date_naive()) {
        *per_day.entry(day).or_default() += 1;
    }
    let mut cumulative: u64 = per_day.range(..first).map(|(_, n)| n).sum();

    first
        .iter_days()
        .take_while(|day| *day <= today)
        .map(|date| {
            let signups = per_day.get(&date).copied().unwrap_or(0);
            cumulative += signups;
            DailySignups {
                date,
                signups,
                cumulative,
            }
        })
        .collect()
}

fn week_start(day: NaiveDate) -> NaiveDate {
    day - TimeDelta::days(i64::from(day.weekday().num_days_from_monday()))
}

/// Trip owners of one registration week: everyone who ever recorded a trip, and who was active
/// in each week since registering.
#[derive(Default)]
struct CohortActivity {
    users: HashSet<ProfileId>,
    by_offset: BTreeMap<u32, HashSet<ProfileId>>,
}

fn cohort_activity(profiles: &[Profile], trips: &[Trip]) -> HashMap<NaiveDate, CohortActivity> {
    let cohort_of: HashMap<ProfileId, NaiveDate> = profiles
        .iter()
        .filter_map(|p| Some((p.id, week_start(p.created_at?.date_naive()))))
        .collect();

    let mut activity: HashMap<NaiveDate, CohortActivity> = HashMap::new();
    for trip in trips {
        let (Some(cohort), Some(at)) = (cohort_of.get(&trip.user_id), trip.activity_at()) else {
            continue;
        };
        let entry = activity.entry(*cohort).or_default();
        entry.users.insert(trip.user_id);
        // Trips logged before registering only count towards the cohort size
        let weeks = (week_start(at.date_naive()) - *cohort).num_days() / 7;
        if let Ok(offset) = u32::try_from(weeks) {
            entry.by_offset.entry(offset).or_default().insert(trip.user_id);
        }
    }
    activity
}

/// Share of a cohort's trip owners active in each week from registration up to the current week.
fn cohort_retention(activity: Option<&CohortActivity>, cohort: NaiveDate, current_week: NaiveDate) -> Vec<CohortRetention> {
    let elapsed = ((current_week - cohort).num_days() / 7).clamp(0, COHORT_WEEKS as i64) as u32;
    let size = activity.map_or(0, |a| a.users.len() as u64);

    (0..=elapsed)
        .map(|week| {
            let active_users = activity
                .and_then(|a| a.by_offset.get(&week))
                .map_or(0, |users| users.len() as u64);
            CohortRetention {
                week,
                active_users,
                rate: percent(active_users, size),
            }
        })
        .collect()
}

/// Retention, activation and registration cohorts.
///
/// A user activates on the day of their first trip and is retained at day K when any of their
/// trips falls on or after activation + K. Users whose day K is still in the future are left out
/// of that day's denominator.
pub fn retention(profiles: &[Profile], trips: &[Trip], now: DateTime<Utc>) -> RetentionReport {
    let today = now.date_naive();

    // (first trip day, last trip day) per user
    let mut spans: HashMap<ProfileId, (NaiveDate, NaiveDate)> = HashMap::new();
    for trip in trips {
        if let Some(day) = trip.day() {
            spans
                .entry(trip.user_id)
                .and_modify(|(first, last)| {
                    *first = (*first).min(day);
                    *last = (*last).max(day);
                })
                .or_insert((day, day));
        }
    }
    let known: HashSet<ProfileId> = profiles.iter().map(|p| p.id).collect();
    spans.retain(|id, _| known.contains(id));

    let retention = RETENTION_DAYS
        .iter()
        .map(|&day| {
            let offset = TimeDelta::days(i64::from(day));
            let eligible: Vec<_> = spans.values().filter(|(first, _)| *first + offset <= today).collect();
            let retained = eligible.iter().filter(|(first, last)| *last >= *first + offset).count() as u64;
            let eligible_users = eligible.len() as u64;
            RetentionPoint {
                day,
                eligible_users,
                retained_users: retained,
                rate: (eligible_users > 0).then(|| percent(retained, eligible_users)),
            }
        })
        .collect();

    let days_to_first: Vec<i64> = profiles
        .iter()
        .filter_map(|p| {
            let (first, _) = spans.get(&p.id)?;
            Some((*first - p.created_at?.date_naive()).num_days().max(0))
        })
        .collect();
    let total_users = profiles.len() as u64;
    let activated_users = spans.len() as u64;
    let within = |limit: i64| percent(days_to_first.iter().filter(|d| **d <= limit).count() as u64, activated_users);

    let activation = ActivationSummary {
        total_users,
        activated_users,
        activation_rate: percent(activated_users, total_users),
        within_1_day: within(1),
        within_7_days: within(7),
        within_30_days: within(30),
    };

    let mut weeks: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
    for profile in profiles {
        if let Some(created) = profile.created_at {
            let entry = weeks.entry(week_start(created.date_naive())).or_default();
            entry.0 += 1;
            if spans.contains_key(&profile.id) {
                entry.1 += 1;
            }
        }
    }
    let activity = cohort_activity(profiles, trips);
    let current_week = week_start(today);
    let skip = weeks.len().saturating_sub(COHORT_WEEKS);
    let cohorts = weeks
        .into_iter()
        .skip(skip)
        .map(|(week_start, (registered, activated))| WeeklyCohort {
            week_start,
            registered,
            activated,
            activation_rate: percent(activated, registered),
            weekly_retention: cohort_retention(activity.get(&week_start), week_start, current_week),
        })
        .collect();

    let time_to_first_trip = (0..=30)
        .map(|days| ActivationBucket {
            days,
            users: days_to_first.iter().filter(|d| **d == days).count() as u64,
        })
        .collect();

    RetentionReport {
        retention,
        activation,
        cohorts,
        time_to_first_trip,
    }
}

fn price_for(pricing: &BTreeMap<String, Decimal>, tier: &str) -> Decimal {
    pricing
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(tier))
        .map_or(Decimal::ZERO, |(_, price)| *price)
}

/// Recurring revenue from the tier of every profile. Tiers without a price earn nothing.
pub fn revenue(profiles: &[Profile], pricing: &BTreeMap<String, Decimal>) -> RevenueReport {
    let mut counts: BTreeMap<String, u64> = pricing.keys().map(|tier| (tier.to_lowercase(), 0)).collect();
    for profile in profiles {
        *counts.entry(profile.tier()).or_default() += 1;
    }

    let total_users = profiles.len() as u64;
    let mut tiers: Vec<TierBreakdown> = counts
        .into_iter()
        .map(|(tier, users)| {
            let monthly_price = price_for(pricing, &tier);
            TierBreakdown {
                revenue: (monthly_price * Decimal::from(users)).round_dp(2),
                percentage: percent(users, total_users),
                tier,
                users,
                monthly_price,
            }
        })
        .collect();
    tiers.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| b.users.cmp(&a.users)));

    let mrr: Decimal = tiers.iter().map(|t| t.revenue).sum();
    let arpu = if total_users == 0 {
        Decimal::ZERO
    } else {
        (mrr / Decimal::from(total_users)).round_dp(2)
    };

    RevenueReport {
        total_users,
        paying_users: tiers.iter().filter(|t| t.monthly_price > Decimal::ZERO).map(|t| t.users).sum(),
        mrr,
        arr: mrr * Decimal::from(12),
        arpu,
        tiers,
    }
}

/// Feed entries for the given trips, newest first as supplied.
pub fn activity_feed(trips: &[Trip], owners: &HashMap<ProfileId, Profile>) -> Vec<ActivityEntry> {
    trips
        .iter()
        .map(|trip| {
            let owner = owners.get(&trip.user_id);
            ActivityEntry {
                trip_id: trip.id,
                time: trip.activity_at(),
                user: owner
                    .and_then(|p| p.full_name.clone())
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_USER.to_string()),
                subscription_tier: owner.map_or_else(|| DEFAULT_TIER.to_string(), Profile::tier),
                distance: trip.effective_distance(),
                duration_minutes: trip.duration_minutes(),
                purpose: trip.purpose.clone(),
                status: trip.status.clone(),
            }
        })
        .collect()
}
