//! Dependency checking and application order for loaded packages.
//!
//! [`resolve`] first checks every `Success` package's declared
//! dependencies, downgrading packages whose required dependencies are
//! missing or out of range, then orders the remaining `Success` packages
//! with Kahn's algorithm so that every dependency precedes its dependants.

use crate::package::{Dependency, PackageSet, PackageStatus, RESERVED_ID};
use semver::Version;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error, warn};

/// The dependency graph of `Success` packages has no topological order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dependency cycle among packages: {}", .packages.join(", "))]
pub struct CycleError {
    /// Packages that could not be ordered, in insertion order.
    pub packages: Vec<String>,
}

/// A dependency that could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DependencyError {
    #[error("'{package}' depends on '{dependency}', which is not loaded")]
    Missing { package: String, dependency: String },
    #[error("'{package}' needs '{dependency}' {range}, found {found}")]
    VersionMismatch {
        package: String,
        dependency: String,
        range: String,
        found: Version,
    },
}

/// One recorded dependency problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyProblem {
    pub error: DependencyError,
    /// Whether the dependency was required (and the package downgraded).
    pub required: bool,
}

/// Output of a successful resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Sorted `Success` packages followed by every other package in
    /// insertion order.
    pub order: Vec<String>,
    pub problems: Vec<DependencyProblem>,
}

impl Resolution {
    /// Number of leading entries of [`Resolution::order`] that are merge candidates.
    pub fn sorted_len(&self, packages: &PackageSet) -> usize {
        self.order
            .iter()
            .take_while(|id| packages.get(*id).is_some_and(|p| p.is_success()))
            .count()
    }
}

fn describe_range(dep: &Dependency) -> String {
    match (&dep.min, &dep.max) {
        (Some(min), Some(max)) => format!("between {min} and {max}"),
        (Some(min), None) => format!(">= {min}"),
        (None, Some(max)) => format!("<= {max}"),
        (None, None) => "any version".to_string(),
    }
}

/// Check one dependency against the loaded set and the host version.
fn check_dependency(
    package: &str,
    dep: &Dependency,
    packages: &PackageSet,
    host_version: Option<&Version>,
) -> Option<DependencyError> {
    let found = if dep.id == RESERVED_ID {
        // Without a configured host version there is nothing to check.
        host_version?
    } else {
        match packages.get(&dep.id) {
            Some(target) => &target.version,
            None => {
                return Some(DependencyError::Missing {
                    package: package.to_string(),
                    dependency: dep.id.clone(),
                });
            }
        }
    };

    if dep.accepts(found) {
        None
    } else {
        Some(DependencyError::VersionMismatch {
            package: package.to_string(),
            dependency: dep.id.clone(),
            range: describe_range(dep),
            found: found.clone(),
        })
    }
}

/// Downgrade packages with unsatisfied required dependencies.
fn check_dependencies(
    packages: &mut PackageSet,
    host_version: Option<&Version>,
) -> Vec<DependencyProblem> {
    let mut problems = Vec::new();

    let ids: Vec<String> = packages.keys().cloned().collect();
    for id in ids {
        let Some(package) = packages.get(&id) else {
            continue;
        };
        if !package.is_success() {
            continue;
        }

        let mut found = Vec::new();
        for dep in &package.dependencies {
            if let Some(err) = check_dependency(&id, dep, packages, host_version) {
                found.push(DependencyProblem {
                    error: err,
                    required: dep.required,
                });
                if dep.required {
                    break;
                }
            }
        }

        let Some(package) = packages.get_mut(&id) else {
            continue;
        };
        for problem in found {
            if problem.required {
                error!("{}", problem.error);
                package.fail(PackageStatus::DependenciesUnsatisfied, problem.error.to_string());
            } else {
                warn!("optional dependency unsatisfied: {}", problem.error);
                package.warn(problem.error.to_string());
            }
            problems.push(problem);
        }
    }

    problems
}

/// Order `Success` packages so each follows all of its dependencies.
///
/// Among packages that become ready at the same time the one loaded first
/// wins, so the order is stable for a fixed input set.
fn topological_order(packages: &PackageSet) -> Result<Vec<String>, CycleError> {
    let nodes: Vec<&str> = packages
        .values()
        .filter(|p| p.is_success())
        .map(|p| p.id.as_str())
        .collect();
    let position: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    // Edges run dependency -> dependant.
    let mut dependants: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    for (node, id) in nodes.iter().enumerate() {
        let Some(package) = packages.get(*id) else {
            continue;
        };
        for dep in &package.dependencies {
            if let Some(&from) = position.get(dep.id.as_str()) {
                dependants[from].push(node);
                in_degree[node] += 1;
            }
        }
    }

    // Seed with every zero-in-degree node.
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order: Vec<usize> = Vec::with_capacity(nodes.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &dest in &dependants[node] {
            in_degree[dest] -= 1;
            if in_degree[dest] == 0 {
                ready.insert(dest);
            }
        }
    }

    if order.len() != nodes.len() {
        let packages: Vec<String> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg > 0)
            .map(|(i, _)| nodes[i].to_string())
            .collect();
        return Err(CycleError { packages });
    }

    Ok(order.into_iter().map(|i| nodes[i].to_string()).collect())
}

/// Check dependencies and compute the application order.
///
/// Status downgrades are written into `packages` even when a cycle is
/// found afterwards.
pub fn resolve(
    packages: &mut PackageSet,
    host_version: Option<&Version>,
) -> Result<Resolution, CycleError> {
    let problems = check_dependencies(packages, host_version);

    let mut order = topological_order(packages).inspect_err(|e| error!("{e}"))?;
    order.extend(
        packages
            .values()
            .filter(|p| !p.is_success())
            .map(|p| p.id.clone()),
    );

    debug!("package order: {order:?}");
    Ok(Resolution { order, problems })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn pkg(id: &str, version: &str, deps: Vec<Dependency>) -> Package {
        let mut p = Package::new(id, v(version), vec!["tester".into()]);
        p.dependencies = deps;
        p
    }

    fn set(packages: Vec<Package>) -> PackageSet {
        packages.into_iter().map(|p| (p.id.clone(), p)).collect()
    }

    #[test]
    fn dependency_comes_first() {
        let mut packages = set(vec![
            pkg("b", "1.0.0", vec![Dependency::on("a")]),
            pkg("a", "1.0.0", vec![]),
        ]);
        let res = resolve(&mut packages, None).unwrap();
        assert_eq!(res.order, vec!["a", "b"]);
        assert!(res.problems.is_empty());
    }

    #[test]
    fn scenario_chain() {
        let mut packages = set(vec![
            pkg("a", "1.0.0", vec![]),
            pkg("b", "1.0.0", vec![Dependency::on("a")]),
        ]);
        assert_eq!(resolve(&mut packages, None).unwrap().order, vec!["a", "b"]);
    }

    #[test]
    fn two_package_cycle() {
        let mut packages = set(vec![
            pkg("a", "1.0.0", vec![Dependency::on("b")]),
            pkg("b", "1.0.0", vec![Dependency::on("a")]),
        ]);
        let err = resolve(&mut packages, None).unwrap_err();
        assert_eq!(err.packages, vec!["a", "b"]);
        assert!(format!("{err}").contains("cycle"));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut packages = set(vec![pkg("a", "1.0.0", vec![Dependency::on("a")])]);
        assert!(resolve(&mut packages, None).is_err());
    }

    #[test]
    fn cycle_reports_only_stuck_packages() {
        let mut packages = set(vec![
            pkg("free", "1.0.0", vec![]),
            pkg("x", "1.0.0", vec![Dependency::on("y")]),
            pkg("y", "1.0.0", vec![Dependency::on("x")]),
        ]);
        let err = resolve(&mut packages, None).unwrap_err();
        assert_eq!(err.packages, vec!["x", "y"]);
    }

    #[test]
    fn ties_follow_insertion_order() {
        let mut packages = set(vec![
            pkg("zeta", "1.0.0", vec![]),
            pkg("alpha", "1.0.0", vec![]),
            pkg("mid", "1.0.0", vec![Dependency::on("zeta")]),
        ]);
        let res = resolve(&mut packages, None).unwrap();
        // mid becomes ready after zeta, but alpha was loaded earlier.
        assert_eq!(res.order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn missing_required_dependency_downgrades() {
        let mut packages = set(vec![
            pkg("a", "1.0.0", vec![Dependency::on("ghost")]),
            pkg("b", "1.0.0", vec![]),
        ]);
        let res = resolve(&mut packages, None).unwrap();
        assert_eq!(packages["a"].status(), PackageStatus::DependenciesUnsatisfied);
        // Non-success packages trail the sorted ones.
        assert_eq!(res.order, vec!["b", "a"]);
        assert_eq!(res.sorted_len(&packages), 1);
        assert!(matches!(
            res.problems[0].error,
            DependencyError::Missing { ref dependency, .. } if dependency == "ghost"
        ));
    }

    #[test]
    fn first_required_failure_stops_the_list() {
        let mut packages = set(vec![pkg(
            "a",
            "1.0.0",
            vec![Dependency::on("ghost"), Dependency::on("phantom")],
        )]);
        let res = resolve(&mut packages, None).unwrap();
        assert_eq!(res.problems.len(), 1);
        assert_eq!(packages["a"].problems().len(), 1);
    }

    #[test]
    fn missing_optional_dependency_only_warns() {
        let mut optional = Dependency::on("ghost");
        optional.required = false;
        let mut packages = set(vec![pkg("a", "1.0.0", vec![optional])]);
        let res = resolve(&mut packages, None).unwrap();
        assert!(packages["a"].is_success());
        assert_eq!(res.order, vec!["a"]);
        assert!(!res.problems[0].required);
        assert_eq!(packages["a"].problems().len(), 1);
    }

    #[test]
    fn version_out_of_range_downgrades() {
        let dep = Dependency {
            id: "lib".into(),
            min: Some(v("2.0.0")),
            max: None,
            required: true,
        };
        let mut packages = set(vec![pkg("lib", "1.4.0", vec![]), pkg("app", "1.0.0", vec![dep])]);
        let res = resolve(&mut packages, None).unwrap();
        assert_eq!(packages["app"].status(), PackageStatus::DependenciesUnsatisfied);
        match &res.problems[0].error {
            DependencyError::VersionMismatch { range, found, .. } => {
                assert_eq!(range, ">= 2.0.0");
                assert_eq!(found, &v("1.4.0"));
            }
            other => panic!("expected VersionMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn host_dependency_checks_host_version() {
        let dep = Dependency {
            id: RESERVED_ID.into(),
            min: Some(v("1.2.0")),
            max: Some(v("1.9.0")),
            required: true,
        };
        let mut ok = set(vec![pkg("a", "1.0.0", vec![dep.clone()])]);
        resolve(&mut ok, Some(&v("1.5.0"))).unwrap();
        assert!(ok["a"].is_success());

        let mut old = set(vec![pkg("a", "1.0.0", vec![dep.clone()])]);
        resolve(&mut old, Some(&v("1.0.0"))).unwrap();
        assert_eq!(old["a"].status(), PackageStatus::DependenciesUnsatisfied);

        let mut unknown = set(vec![pkg("a", "1.0.0", vec![dep])]);
        resolve(&mut unknown, None).unwrap();
        assert!(unknown["a"].is_success());
    }

    #[test]
    fn downgraded_dependency_does_not_block_order() {
        let mut packages = set(vec![
            pkg("base_units", "1.0.0", vec![Dependency::on("ghost")]),
            pkg("more", "1.0.0", vec![Dependency::on("base_units")]),
        ]);
        let res = resolve(&mut packages, None).unwrap();
        // `more` only needs base_units to be loaded, not successful.
        assert!(packages["more"].is_success());
        assert_eq!(res.order, vec!["more", "base_units"]);
    }

    #[test]
    fn error_packages_are_not_sorted() {
        let mut broken = pkg("broken", "1.0.0", vec![Dependency::on("broken")]);
        broken.fail(PackageStatus::Error, "earlier failure");
        let mut packages = set(vec![broken, pkg("ok", "1.0.0", vec![])]);
        // The self-cycle is ignored because `broken` is not a graph node.
        let res = resolve(&mut packages, None).unwrap();
        assert_eq!(res.order, vec!["ok", "broken"]);
    }
}
