use std::sync::Arc;
use tessera_core::prelude::*;
use tessera_validator::{TypeConverterRegistry, ValidationError};
use tessera_web::exception_handler::{CatchAllExceptionHandler, TypedExceptionHandler};
use tessera_web::prelude::*;
use tessera_web::DispatcherSettings;

// ==================== 计算器 ====================

#[derive(Debug, Default, Bean)]
struct CalculatorActionBean {
    #[validate(required)]
    number_one: Option<f64>,
    #[validate(required)]
    number_two: Option<f64>,
    result: Option<f64>,
}

fn calculator() -> ActionBeanDefinition {
    ActionBeanBuilder::<CalculatorActionBean>::new("/Calculator.action")
        .default_handler("addition", |bean: &mut CalculatorActionBean, _| {
            bean.result = Some(bean.number_one.unwrap_or_default() + bean.number_two.unwrap_or_default());
            Ok(Outcome::forward("/calculator.jsp"))
        })
        .handler("division", |bean: &mut CalculatorActionBean, _| {
            bean.result = Some(bean.number_one.unwrap_or_default() / bean.number_two.unwrap_or(1.0));
            Ok(Outcome::forward("/calculator.jsp"))
        })
        .validation_method(
            ValidationMethod::new("divideByZero", |bean: &CalculatorActionBean, errors| {
                if bean.number_two == Some(0.0) {
                    errors.add("numberTwo", ValidationError::simple("Dividing by zero is not allowed."));
                }
            })
            .on(["division"]),
        )
        .build()
}

inventory::submit! {
    ActionBeanRegistration::new("CalculatorActionBean", calculator)
}

// ==================== 缺陷跟踪 ====================

#[derive(Debug, Clone, Copy, PartialEq, Enumerated)]
enum Priority {
    Blocker,
    Critical,
    Major,
    Minor,
}

#[derive(Debug, Default, Bean)]
struct Attachment {
    #[validate(required)]
    name: Option<String>,
    size: Option<u64>,
}

#[derive(Debug, Default, Bean)]
struct BugActionBean {
    id: Option<u32>,
    #[validate(required, min_length = 10, max_length = 2000)]
    description: Option<String>,
    priority: Option<Priority>,
    #[validate(nested)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, thiserror::Error)]
#[error("bug {0} does not exist")]
struct BugNotFound(u32);

fn bug() -> ActionBeanDefinition {
    ActionBeanBuilder::<BugActionBean>::new("/bugs/{id}")
        .default_handler("view", |bean: &mut BugActionBean, _| match bean.id {
            Some(id) if id > 1000 => Err(BugNotFound(id).into()),
            _ => Ok(Outcome::forward("/bugs/view.jsp")),
        })
        .handler("save", |bean: &mut BugActionBean, cx| {
            tracing::info!(
                id = ?bean.id,
                priority = ?bean.priority,
                attachments = bean.attachments.len(),
                "Saving bug"
            );
            Ok(Outcome::redirect(cx.url_binding()).with_parameter("saved", ["true"]))
        })
        .event(
            Event::new("export", |bean: &mut BugActionBean, _| {
                let body = format!(
                    "id,priority,description\n{},{},{}\n",
                    bean.id.unwrap_or_default(),
                    bean.priority.map(|p| p.name()).unwrap_or(""),
                    bean.description.as_deref().unwrap_or("")
                );
                Ok(Outcome::stream("text/csv", body).with_filename("bug.csv"))
            })
            .dont_validate(),
        )
        .build()
}

inventory::submit! {
    ActionBeanRegistration::new("BugActionBean", bug)
}

fn bug_not_found_handler() -> Box<dyn ExceptionHandler> {
    Box::new(TypedExceptionHandler::new(
        "bugNotFound",
        |e: &BugNotFound, _: &ExceptionContext| {
            Some(Outcome::forward("/bugs/missing.jsp").with_parameter("id", [e.0]))
        },
    ))
}

inventory::submit! {
    ExceptionHandlerRegistration::new("bugNotFound", bug_not_found_handler)
}

fn error_page_handler() -> Box<dyn ExceptionHandler> {
    Box::new(CatchAllExceptionHandler::new(
        |error: &(dyn std::error::Error + 'static), cx: &ExceptionContext| {
            tracing::error!(path = %cx.path, error = %error, "Falling back to error page");
            Some(Outcome::forward("/error.jsp"))
        },
    ))
}

inventory::submit! {
    ExceptionHandlerRegistration::fallback("errorPage", error_page_handler)
}

// ==================== 注册向导 ====================

#[derive(Debug, Default, Bean)]
struct SignupWizardActionBean {
    #[validate(required)]
    username: Option<String>,
    #[validate(required, pattern = "^[^@\\s]+@[^@\\s]+$")]
    email: Option<String>,
    #[validate(required, min_length = 6)]
    password: Option<String>,
    accepted_terms: bool,
}

fn signup() -> ActionBeanDefinition {
    ActionBeanBuilder::<SignupWizardActionBean>::new("/Signup.action")
        .wizard()
        .handler("gotoStep2", |_: &mut SignupWizardActionBean, _| {
            Ok(Outcome::forward("/signup/step2.jsp"))
        })
        .handler("finish", |bean: &mut SignupWizardActionBean, _| {
            Ok(Outcome::redirect("/welcome.jsp").with_parameter("user", bean.username.clone()))
        })
        .validation_method(
            ValidationMethod::new("termsAccepted", |bean: &SignupWizardActionBean, errors| {
                if !bean.accepted_terms {
                    errors.add("acceptedTerms", ValidationError::simple("Please accept the terms"));
                }
            })
            .on(["finish"])
            .when_valid(),
        )
        .build()
}

// ==================== 启动 ====================

fn load_environment() -> anyhow::Result<Environment> {
    let env = Environment::new();

    let config_file = if std::path::Path::new("demos/quickstart/application.toml").exists() {
        "demos/quickstart/application.toml"
    } else {
        "application.toml"
    };
    if std::path::Path::new(config_file).exists() {
        env.add_property_source(Box::new(TomlPropertySource::from_file(config_file)?));
    }
    env.add_property_source(Box::new(EnvironmentPropertySource::new("QUICKSTART_")));

    Ok(env)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    LoggingConfig::from_env().init()?;

    println!("🧩 Tessera - Quickstart Demo");
    println!("============================\n");

    let env = load_environment()?;

    let resolver = ActionResolver::builder()
        .register_inventory()
        .register(signup())
        .build()
        .context("Failed to build action resolver")?;

    let handlers = ExceptionHandlerRegistry::new().register_inventory();

    let dispatcher = Dispatcher::new(Arc::new(resolver))
        .with_converters(TypeConverterRegistry::new())
        .with_exception_handlers(handlers)
        .with_settings(DispatcherSettings::from_environment(&env));

    println!("📋 可用的 action：\n");
    for binding in dispatcher.resolver().bindings() {
        println!("  {:<28} -> {}", binding.pattern(), binding.handler_name());
    }
    println!();
    println!("  示例：");
    println!("  GET  /Calculator.action?numberOne=3&numberTwo=4");
    println!("  GET  /Calculator.action?numberOne=5&numberTwo=0&division=");
    println!("  POST /bugs/7/save  description=...&priority=Major&attachments[0].name=log.txt");
    println!("  GET  /bugs/7/export\n");

    ActionServer::new(dispatcher, ServerProperties::from_environment(&env))
        .run()
        .await
}
