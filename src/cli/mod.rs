//! 命令行前端
//!
//! 解析参数、组装聚合器, 并把结果打印到终端。

pub mod args;

use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Duration, Local, NaiveDate};
use tracing::info;

use crate::config::ConfigManager;
use crate::gitlab::{CommitAggregator, GitLabApiClient, InstanceRegistry};
use crate::models::{CommitInfo, Connection};
use crate::storage::{CommitStore, JsonCommitStore};

use args::{Args, Command, ConnectionAction, ProjectAction, WeekArgs};

/// 构建完整依赖栈并执行子命令
pub async fn run(args: Args) -> anyhow::Result<()> {
    let storage_path = ConfigManager::storage_path_from_env();
    let config = Arc::new(ConfigManager::load(storage_path).context("加载配置失败")?);
    let api_client = Arc::new(GitLabApiClient::new().context("构建 HTTP 客户端失败")?);
    let registry = Arc::new(InstanceRegistry::new(
        Arc::clone(&config),
        Arc::clone(&api_client),
    ));

    // 后台解析缺失的连接身份, 不阻塞命令执行
    let init = registry.initialize();

    let aggregator = CommitAggregator::new(
        Arc::clone(&config),
        Arc::clone(&registry),
        Arc::clone(&api_client),
    );

    match args.command {
        Command::Connections { action } => run_connections(&registry, &aggregator, action).await?,
        Command::Week(week) => run_week(&config, &aggregator, week).await?,
        Command::Projects { action } => run_projects(&aggregator, action).await?,
        Command::ClearCache => {
            aggregator.clear_all_caches();
            println!("已清空项目与提交缓存");
        }
    }

    // 等待身份解析结束, 避免丢失持久化写入
    let _ = init.await;
    Ok(())
}

async fn run_connections(
    registry: &Arc<InstanceRegistry>,
    aggregator: &CommitAggregator,
    action: ConnectionAction,
) -> anyhow::Result<()> {
    match action {
        ConnectionAction::List => {
            let connections = registry.connections().await;
            if connections.is_empty() {
                println!("尚未配置任何连接");
                return Ok(());
            }
            for connection in connections {
                print_connection(&connection);
            }
        }
        ConnectionAction::Add { name, url, token } => {
            let connection = Connection {
                name,
                server_url: url,
                access_token: token,
                ..Default::default()
            };
            let added = registry.add_and_resolve_identity(connection).await?;
            println!("已添加连接: {} ({})", added.name, added.id);
            if let Some(username) = &added.user_name {
                println!("当前用户: {}", username);
            }
        }
        ConnectionAction::Remove { id } => {
            if registry.remove(&id).await? {
                aggregator.clear_commit_cache();
                println!("已删除连接 {}", id);
            } else {
                println!("未找到连接 {}", id);
            }
        }
        ConnectionAction::Rename { id, name } => match registry.get(&id).await {
            Some(mut connection) => {
                connection.name = name.clone();
                registry.update(connection).await?;
                aggregator.update_connection_name(&id, &name);
                println!("已重命名连接 {} -> {}", id, name);
            }
            None => println!("未找到连接 {}", id),
        },
        ConnectionAction::SetActive { id } => {
            registry.set_active(&id).await?;
            println!("已切换活跃连接: {}", id);
        }
        ConnectionAction::Test { id } => {
            if registry.test_connection(&id).await? {
                println!("连接正常");
            } else {
                println!("连接失败, 请检查地址和令牌");
            }
        }
    }
    Ok(())
}

async fn run_projects(aggregator: &CommitAggregator, action: ProjectAction) -> anyhow::Result<()> {
    match action {
        ProjectAction::List => {
            aggregator.ensure_projects_loaded().await;
            let projects = aggregator.all_projects();
            if projects.is_empty() {
                println!("没有项目, 请先添加连接或执行 projects refresh");
                return Ok(());
            }
            for project in projects {
                let marker = if project.is_selected { "*" } else { " " };
                println!("{} [{}] {}", marker, project.id, project.display_name());
            }
        }
        ProjectAction::Refresh => {
            aggregator.clear_project_cache();
            aggregator.refresh_all_projects().await;
            println!("已刷新 {} 个项目", aggregator.all_projects().len());
        }
        ProjectAction::Select { ids } => {
            aggregator.ensure_projects_loaded().await;
            let selected: Vec<_> = aggregator
                .all_projects()
                .into_iter()
                .filter(|p| ids.contains(&p.id))
                .collect();
            if selected.len() != ids.len() {
                println!("警告: 部分项目 id 未找到 (匹配 {}/{})", selected.len(), ids.len());
            }
            aggregator.set_selected_projects(&selected).await?;
            println!("已选择 {} 个项目参与聚合", selected.len());
        }
    }
    Ok(())
}

async fn run_week(
    config: &Arc<ConfigManager>,
    aggregator: &CommitAggregator,
    week: WeekArgs,
) -> anyhow::Result<()> {
    let (start, end) = resolve_week(week.start, week.end);
    info!(%start, %end, "Fetching commits for week");

    let selected = aggregator.selected_projects().await;
    if selected.is_empty() {
        println!("没有选中的项目, 请先执行 projects select");
        return Ok(());
    }

    let store = JsonCommitStore::in_dir(config.storage_path());

    let commits = if week.offline {
        aggregator
            .my_commits_for_week_from_store(&store, start, end, &selected)
            .await?
    } else if week.mine {
        aggregator.my_commits_for_week(start, end, &selected).await
    } else if week.details {
        let mut all = Vec::new();
        for project in &selected {
            all.extend(aggregator.commits_with_details(project, start, end).await?);
        }
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all
    } else {
        aggregator.commits_for_week(start, end, &selected).await
    };

    if week.save && !week.offline {
        let added = store.save_commits(&commits).await?;
        println!("已写入本地存储 {} 条新提交", added);
    }

    print_commits(&commits, start, end);
    Ok(())
}

/// 默认周区间: 本周一到周日
fn resolve_week(start: Option<NaiveDate>, end: Option<NaiveDate>) -> (NaiveDate, NaiveDate) {
    let start = start.unwrap_or_else(|| {
        let today = Local::now().date_naive();
        today - Duration::days(today.weekday().num_days_from_monday() as i64)
    });
    let end = end.unwrap_or(start + Duration::days(6));
    (start, end)
}

fn print_connection(connection: &Connection) {
    let marker = if connection.is_active { "*" } else { " " };
    let identity = connection
        .user_name
        .as_deref()
        .unwrap_or("身份未解析");
    println!(
        "{} [{}] {} {} ({})",
        marker, connection.id, connection.name, connection.server_url, identity
    );
}

fn print_commits(commits: &[CommitInfo], start: NaiveDate, end: NaiveDate) {
    println!("{} ~ {} 共 {} 条提交", start, end, commits.len());
    for commit in commits {
        let ticket = commit
            .ticket_id
            .as_deref()
            .map(|t| format!(" [{}]", t))
            .unwrap_or_default();
        println!(
            "{} {} {}{} {} ({})",
            commit.timestamp.format("%m-%d %H:%M"),
            commit.hash,
            commit.commit_type.prefix(),
            ticket,
            commit.message.lines().next().unwrap_or(""),
            commit.project_name,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_week_defaults_to_monday() {
        let (start, end) = resolve_week(None, None);
        assert_eq!(start.weekday().num_days_from_monday(), 0);
        assert_eq!(end, start + Duration::days(6));
    }

    #[test]
    fn test_resolve_week_explicit_start() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let (s, e) = resolve_week(Some(start), None);
        assert_eq!(s, start);
        assert_eq!(e, NaiveDate::from_ymd_opt(2026, 3, 8).unwrap());
    }
}
