//! Candidate selection: which applications of a tier to upgrade this run.

use chrono::{DateTime, Utc};
use fleetgrid_state::ApplicationId;
use semver::Version;

use crate::applications::ApplicationList;

/// Inputs to candidate selection besides the fleet snapshot.
#[derive(Debug, Clone)]
pub struct CandidateQuery<'a> {
    pub target: &'a Version,
    /// Major version for applications that do not pin one. Defaults to the
    /// target's own major.
    pub target_major_version: Option<u64>,
    /// Clock for upgrade-blocked windows.
    pub now: DateTime<Utc>,
    pub budget: usize,
}

/// Select the applications to upgrade to `query.target`, lowest deployed
/// version first, at most `query.budget` of them.
///
/// `applications` should already be narrowed to one tier.
pub fn select_candidates(applications: ApplicationList, query: &CandidateQuery<'_>) -> Vec<ApplicationId> {
    let target = query.target;
    let default_major = query.target_major_version.unwrap_or(target.major);
    applications
        .has_production_deployment()
        .on_lower_version_than(target)
        .allow_major_version(target.major, default_major)
        .not_deploying()
        .not_failing_on(target)
        .can_upgrade_at(query.now)
        .by_increasing_deployed_version()
        .first(query.budget)
        .ids()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};
    use fleetgrid_state::{ApplicationRecord, BlockWindow, Change, Deployment, Tier};

    fn monday_noon() -> DateTime<Utc> {
        // 2024-01-01 was a Monday.
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn app(name: &str, deployed: &str) -> ApplicationRecord {
        let mut record = ApplicationRecord::new(ApplicationId::new("t", name), Tier::Default);
        record
            .deployments
            .push(Deployment::new("prod.us-east-3", v(deployed)));
        record
    }

    fn query(target: &Version, budget: usize) -> CandidateQuery<'_> {
        CandidateQuery {
            target,
            target_major_version: None,
            now: monday_noon(),
            budget,
        }
    }

    fn names(ids: Vec<ApplicationId>) -> Vec<String> {
        ids.into_iter().map(|id| id.application).collect()
    }

    #[test]
    fn lowest_versions_first_within_budget() {
        let apps = ApplicationList::from(vec![
            app("two", "2.0.0"),
            app("five", "5.0.0"),
            app("three", "3.0.0"),
        ]);
        let target = v("6.0.0");

        assert_eq!(
            names(select_candidates(apps.clone(), &query(&target, 3))),
            vec!["two", "three", "five"]
        );
        assert_eq!(
            names(select_candidates(apps, &query(&target, 1))),
            vec!["two"]
        );
    }

    #[test]
    fn skips_applications_already_at_target() {
        let apps = ApplicationList::from(vec![app("at", "7.2.0"), app("above", "7.3.0"), app("below", "7.1.0")]);
        let target = v("7.2.0");
        assert_eq!(names(select_candidates(apps, &query(&target, 10))), vec!["below"]);
    }

    #[test]
    fn skips_inflight_failed_and_blocked() {
        let mut busy = app("busy", "7.0.0");
        busy.change = Some(Change::Application {
            revision: "3".to_string(),
        });
        let mut failed = app("failed", "7.0.0");
        failed.deployments[0].failing_on = Some(v("7.2.0"));
        let mut blocked = app("blocked", "7.0.0");
        blocked.upgrade_block = Some(BlockWindow {
            days: vec![Weekday::Mon],
            from_hour: 8,
            to_hour: 16,
        });
        let bare = ApplicationRecord::new(ApplicationId::new("t", "bare"), Tier::Default);

        let apps = ApplicationList::from(vec![busy, failed, blocked, bare, app("ready", "7.0.0")]);
        let target = v("7.2.0");
        assert_eq!(names(select_candidates(apps, &query(&target, 10))), vec!["ready"]);
    }

    #[test]
    fn major_override_holds_back_unpinned_applications() {
        let mut pinned = app("pinned", "7.9.0");
        pinned.major_version = Some(8);
        let apps = ApplicationList::from(vec![app("unpinned", "7.9.0"), pinned]);
        let target = v("8.0.0");

        let mut held = query(&target, 10);
        held.target_major_version = Some(7);
        assert_eq!(names(select_candidates(apps.clone(), &held)), vec!["pinned"]);

        assert_eq!(
            names(select_candidates(apps, &query(&target, 10))),
            vec!["unpinned", "pinned"]
        );
    }

    #[test]
    fn pinned_lower_major_is_never_crossed() {
        let mut pinned = app("pinned", "7.9.0");
        pinned.major_version = Some(7);
        let apps = ApplicationList::from(vec![pinned]);
        let target = v("8.0.0");

        let mut forced = query(&target, 10);
        forced.target_major_version = Some(8);
        assert!(select_candidates(apps, &forced).is_empty());
    }
}
