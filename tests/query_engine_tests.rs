//! Filtered, paginated reads and state counts.

use std::collections::HashSet;

use anyhow::Result;
use gitportal::error::EngineError;
use gitportal::normalization::ProviderKind;
use gitportal::query::{ListFilters, Pagination, QueryEngine};
use gitportal::repositories::resources::{
    upsert_issues, upsert_pull_requests, upsert_workflow_runs,
};

mod test_utils;
use test_utils::{Harness, issue, pull_request, workflow_run};

/// Two repositories: `acme/app` with 25 issues, `acme/lib` with 3.
async fn seeded() -> Result<Harness> {
    let h = Harness::new().await?;
    let provider = h.github("Work GitHub", Some("t1")).await?;
    let app = h.track(provider.id, "acme/app").await?;
    let lib = h.track(provider.id, "acme/lib").await?;
    let dialect = ProviderKind::Github.dialect();

    let app_issues: Vec<_> = (1..=25)
        .map(|n| {
            let state = if n % 5 == 0 { "closed" } else { "open" };
            let assignees: &[&str] = if n % 2 == 0 { &["OctoCat"] } else { &[] };
            issue(&format!("app-{n}"), n, state, assignees)
        })
        .collect();
    upsert_issues(&*h.db, app.id, dialect, &app_issues).await?;

    let mut lib_issues = vec![
        issue("lib-1", 101, "open", &["hubot"]),
        issue("lib-2", 102, "open", &[]),
        issue("lib-3", 103, "closed", &[]),
    ];
    lib_issues[0].title = "Crash on startup".into();
    lib_issues[1].author = "Mona".into();
    upsert_issues(&*h.db, lib.id, dialect, &lib_issues).await?;

    upsert_pull_requests(
        &*h.db,
        app.id,
        dialect,
        &[
            pull_request("pr-1", 1, "open", false),
            pull_request("pr-2", 2, "closed", true),
            pull_request("pr-3", 3, "closed", false),
        ],
    )
    .await?;

    upsert_workflow_runs(
        &*h.db,
        lib.id,
        dialect,
        &[
            workflow_run("w-1", "completed", Some("success"), "octocat"),
            workflow_run("w-2", "in_progress", None, "hubot"),
            workflow_run("w-3", "completed", Some("cancelled"), "hubot"),
            workflow_run("w-4", "completed", Some("failure"), "octocat"),
        ],
    )
    .await?;

    Ok(h)
}

#[tokio::test]
async fn pages_cover_every_match_exactly_once() -> Result<()> {
    let h = seeded().await?;
    let filters = ListFilters {
        state: Some("open".into()),
        ..Default::default()
    };

    let first = h
        .queries
        .list_issues(&filters, Pagination::new(Some(1), Some(7)))
        .await?;
    let total = first.pagination.total;
    assert_eq!(total, 22);
    assert_eq!(first.pagination.total_pages, 4);

    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for page in 1..=first.pagination.total_pages {
        let result = h
            .queries
            .list_issues(&filters, Pagination::new(Some(page), Some(7)))
            .await?;
        for view in result.data {
            assert_eq!(view.state, "open");
            assert!(seen.insert(view.id), "issue {} returned twice", view.id);
            ordered.push((view.created_at, view.id));
        }
    }
    assert_eq!(seen.len() as u64, total);
    assert!(ordered.windows(2).all(|w| w[0] > w[1]));
    Ok(())
}

#[tokio::test]
async fn page_past_the_end_is_empty_with_totals() -> Result<()> {
    let h = seeded().await?;
    let result = h
        .queries
        .list_issues(&ListFilters::default(), Pagination::new(Some(50), Some(10)))
        .await?;
    assert!(result.data.is_empty());
    assert_eq!(result.pagination.total, 28);
    assert_eq!(result.pagination.total_pages, 3);
    Ok(())
}

#[tokio::test]
async fn huge_page_numbers_are_past_the_end() -> Result<()> {
    let h = seeded().await?;
    let result = h
        .queries
        .list_issues(
            &ListFilters::default(),
            Pagination::new(Some(u64::MAX), Some(10)),
        )
        .await?;
    assert!(result.data.is_empty());
    assert_eq!(result.pagination.page, u64::MAX);
    assert_eq!(result.pagination.total, 28);
    assert_eq!(result.pagination.total_pages, 3);
    Ok(())
}

#[tokio::test]
async fn zero_page_size_returns_only_totals() -> Result<()> {
    let h = seeded().await?;
    let result = h
        .queries
        .list_issues(&ListFilters::default(), Pagination::new(None, Some(0)))
        .await?;
    assert!(result.data.is_empty());
    assert_eq!(result.pagination.total, 28);
    Ok(())
}

#[tokio::test]
async fn assigned_to_me_uses_the_configured_operator() -> Result<()> {
    let h = seeded().await?;
    let filters = ListFilters {
        assigned_to_me: true,
        ..Default::default()
    };

    let result = h
        .queries
        .list_issues(&filters, Pagination::new(None, Some(100)))
        .await?;
    assert_eq!(result.pagination.total, 12);
    assert!(result.data.iter().all(|v| v.assigned_to_me));
    assert!(
        result
            .data
            .iter()
            .all(|v| v.assignees == vec!["octocat".to_string()])
    );
    Ok(())
}

#[tokio::test]
async fn without_an_operator_nothing_is_assigned() -> Result<()> {
    let h = seeded().await?;
    let anonymous = QueryEngine::new(h.db.clone(), None);
    let filters = ListFilters {
        assigned_to_me: true,
        ..Default::default()
    };

    let result = anonymous
        .list_issues(&filters, Pagination::default())
        .await?;
    assert_eq!(result.pagination.total, 0);

    let all = anonymous
        .list_issues(&ListFilters::default(), Pagination::default())
        .await?;
    assert!(all.data.iter().all(|v| !v.assigned_to_me));
    Ok(())
}

#[tokio::test]
async fn text_filters_are_case_insensitive() -> Result<()> {
    let h = seeded().await?;

    let by_search = h
        .queries
        .list_issues(
            &ListFilters {
                search: Some("CRASH".into()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await?;
    assert_eq!(by_search.pagination.total, 1);
    assert_eq!(by_search.data[0].title, "Crash on startup");

    let by_author = h
        .queries
        .list_issues(
            &ListFilters {
                author: Some("mona".into()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await?;
    assert_eq!(by_author.pagination.total, 1);

    let by_repository = h
        .queries
        .list_issues(
            &ListFilters {
                repository: Some("ACME/LIB".into()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await?;
    assert_eq!(by_repository.pagination.total, 3);
    assert!(
        by_repository
            .data
            .iter()
            .all(|v| v.repository_name == "acme/lib")
    );

    let by_provider = h
        .queries
        .list_issues(
            &ListFilters {
                provider: Some("work github".into()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await?;
    assert_eq!(by_provider.pagination.total, 28);
    assert_eq!(by_provider.data[0].provider_name, "Work GitHub");
    Ok(())
}

#[tokio::test]
async fn search_treats_like_wildcards_literally() -> Result<()> {
    let h = seeded().await?;
    let result = h
        .queries
        .list_issues(
            &ListFilters {
                search: Some("%".into()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await?;
    assert_eq!(result.pagination.total, 0);
    Ok(())
}

async fn total_issues(h: &Harness, filters: ListFilters) -> Result<u64> {
    Ok(h
        .queries
        .list_issues(&filters, Pagination::default())
        .await?
        .pagination
        .total)
}

#[tokio::test]
async fn filters_fold_non_ascii_letters() -> Result<()> {
    let h = Harness::new().await?;
    let provider = h.github("Büro GitHub", Some("t1")).await?;
    let repo = h.track(provider.id, "acme/app").await?;
    let mut umlaut = issue("u-1", 1, "open", &[]);
    umlaut.title = "Ärger mit Éclair".into();
    umlaut.author = "Zoë".into();
    upsert_issues(&*h.db, repo.id, ProviderKind::Github.dialect(), &[umlaut]).await?;

    let count = |filters: ListFilters| total_issues(&h, filters);
    let search = |term: &str| ListFilters {
        search: Some(term.into()),
        ..Default::default()
    };

    for term in ["Ärger", "ärger", "ÄRGER", "éclair", "ZOË"] {
        assert_eq!(count(search(term)).await?, 1, "search {term:?}");
    }
    assert_eq!(count(search("arger")).await?, 0);

    let by_author = ListFilters {
        author: Some("zoë".into()),
        ..Default::default()
    };
    assert_eq!(count(by_author).await?, 1);
    let by_provider = ListFilters {
        provider: Some("BÜRO github".into()),
        ..Default::default()
    };
    assert_eq!(count(by_provider).await?, 1);
    Ok(())
}

#[tokio::test]
async fn unknown_state_is_a_validation_error() -> Result<()> {
    let h = seeded().await?;
    let err = h
        .queries
        .list_pull_requests(
            &ListFilters {
                state: Some("draft".into()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn stats_count_by_canonical_state() -> Result<()> {
    let h = seeded().await?;

    let issues = h.queries.issue_stats(&ListFilters::default()).await?;
    assert_eq!(issues.total, 28);
    assert_eq!(issues.by_state["open"], 22);
    assert_eq!(issues.by_state["closed"], 6);

    let prs = h.queries.pull_request_stats(&ListFilters::default()).await?;
    assert_eq!(prs.total, 3);
    assert_eq!(prs.by_state["open"], 1);
    assert_eq!(prs.by_state["merged"], 1);
    assert_eq!(prs.by_state["closed"], 1);

    let runs = h.queries.workflow_stats(&ListFilters::default()).await?;
    assert_eq!(runs.total, 4);
    for state in ["success", "failure", "in_progress", "cancelled"] {
        assert_eq!(runs.by_state[state], 1, "{state}");
    }
    Ok(())
}

#[tokio::test]
async fn stats_honour_non_state_filters_and_list_zero_states() -> Result<()> {
    let h = seeded().await?;
    let stats = h
        .queries
        .issue_stats(&ListFilters {
            repository: Some("acme/lib".into()),
            state: Some("closed".into()),
            ..Default::default()
        })
        .await?;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_state["open"], 2);
    assert_eq!(stats.by_state["closed"], 1);

    let empty = h
        .queries
        .pull_request_stats(&ListFilters {
            repository: Some("acme/lib".into()),
            ..Default::default()
        })
        .await?;
    assert_eq!(empty.total, 0);
    assert_eq!(empty.by_state["merged"], 0);
    Ok(())
}

#[tokio::test]
async fn workflows_are_mine_when_the_operator_triggered_them() -> Result<()> {
    let h = seeded().await?;
    let mine = h
        .queries
        .list_workflows(
            &ListFilters {
                assigned_to_me: true,
                ..Default::default()
            },
            Pagination::default(),
        )
        .await?;
    assert_eq!(mine.pagination.total, 2);
    assert!(mine.data.iter().all(|w| w.author.as_deref() == Some("octocat")));

    let running = h
        .queries
        .list_workflows(
            &ListFilters {
                state: Some("in_progress".into()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await?;
    assert_eq!(running.pagination.total, 1);
    assert_eq!(running.data[0].native_status, "in_progress");
    assert!(running.data[0].conclusion.is_none());
    Ok(())
}

#[tokio::test]
async fn single_item_lookups() -> Result<()> {
    let h = seeded().await?;
    let page = h
        .queries
        .list_pull_requests(&ListFilters::default(), Pagination::default())
        .await?;
    let id = page.data[0].id;

    let view = h.queries.get_pull_request(id).await?;
    assert_eq!(view.repository_name, "acme/app");
    assert_eq!(view.provider_name, "Work GitHub");

    assert!(matches!(
        h.queries.get_issue(9_999).await.unwrap_err(),
        EngineError::NotFound { .. }
    ));
    assert!(matches!(
        h.queries.get_workflow(9_999).await.unwrap_err(),
        EngineError::NotFound { .. }
    ));
    Ok(())
}
