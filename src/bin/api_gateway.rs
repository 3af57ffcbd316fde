use std::net::TcpListener;
use todo_services::configuration::get_configuration;
use todo_services::gateway::run_gateway;
use todo_services::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // 구조화된 로깅 초기화
    init_telemetry();

    tracing::info!("Starting API gateway");

    // 설정 로드
    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // 서버 주소 설정
    let address = format!("127.0.0.1:{}", configuration.gateway.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!("API gateway listening on: {}", address);

    // 서버 실행
    let server = run_gateway(listener, configuration.gateway.clone(), configuration.jwt.clone())?;

    server.await
}
